//! This module handles argument parsing for the editautxt binary.

use crate::auid::Auid;
use crate::autxt::repository_value;
use crate::error::{self, Error, Result};
use argh::{EarlyExit, FromArgs};
use simplelog::LevelFilter;
use snafu::{ensure, ResultExt};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub(crate) const COPYRIGHT: &str = "\
Copyright (c) 2000, Board of Trustees of Leland Stanford Jr. University.
All rights reserved.";

pub(crate) const LICENSE: &str = "\
Redistribution and use in source and binary forms, with or without modification,
are permitted provided that the following conditions are met:

1. Redistributions of source code must retain the above copyright notice, this
list of conditions and the following disclaimer.

2. Redistributions in binary form must reproduce the above copyright notice,
this list of conditions and the following disclaimer in the documentation and/or
other materials provided with the distribution.

3. Neither the name of the copyright holder nor the names of its contributors
may be used to endorse or promote products derived from this software without
specific prior written permission.

THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS \"AS IS\" AND
ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE IMPLIED
WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR
ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES
(INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES;
LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON
ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
(INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS
SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.";

/// Every repository directory must contain this.
const CACHE_DIRNAME: &str = "cache";

/// Edit the LOCKSS daemon's au.txt offline, moving the target AUs from SRCREPO to DSTREPO.
/// Target AUs with no explicit repository are assigned DEFREPO.
///
/// Usage: editautxt [OPTIONS] {--auid AUID|--auids AFILE} AUTXT SRCREPO DSTREPO DEFREPO
#[derive(FromArgs, Debug, PartialEq)]
pub(crate) struct Args {
    /// add AUID to target AUIDs
    #[argh(option, arg_name = "AUID")]
    auid: Vec<String>,

    /// add AUIDs in AFILE to target AUIDs
    #[argh(option, arg_name = "AFILE")]
    auids: Vec<String>,

    /// do not fail if a target AUID is not found in au.txt
    #[argh(switch)]
    warn_if_missing: bool,

    /// do not ask whether the daemon is stopped
    #[argh(switch, short = 'y')]
    yes: bool,

    /// log-level trace|debug|info|warn|error
    #[argh(option)]
    log_level: Option<LevelFilter>,

    /// show copyright and exit
    #[argh(switch, short = 'C')]
    copyright: bool,

    /// show license and exit
    #[argh(switch, short = 'L')]
    license: bool,

    /// show version and exit
    #[argh(switch, short = 'V')]
    version: bool,

    /// AUTXT SRCREPO DSTREPO DEFREPO
    #[argh(positional)]
    paths: Vec<String>,
}

impl Args {
    pub(crate) fn log_level(&self) -> LevelFilter {
        self.log_level.unwrap_or(LevelFilter::Info)
    }

    /// Text for the options that print something and exit without doing any work.
    fn informational(&self) -> Option<String> {
        if self.copyright {
            Some(COPYRIGHT.to_string())
        } else if self.license {
            Some(format!("{}\n\n{}", COPYRIGHT, LICENSE))
        } else if self.version {
            Some(format!(
                "{} {}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
        } else {
            None
        }
    }
}

/// What the command line asks for.
#[derive(Debug, PartialEq)]
pub(crate) enum Invocation {
    /// Print this and exit successfully.
    Exit(String),
    Run(Args),
}

/// Parses the raw process arguments, program name first.
pub(crate) fn parse_args<I>(raw: I) -> Result<Invocation>
where
    I: IntoIterator<Item = String>,
{
    let mut raw = raw.into_iter();
    let program = raw.next().unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
    let command = Path::new(&program)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(&program)
        .to_string();

    let split = split_long_options(raw);
    let split: Vec<&str> = split.iter().map(String::as_str).collect();
    match Args::from_args(&[command.as_str()], &split) {
        Ok(args) => Ok(match args.informational() {
            Some(text) => Invocation::Exit(text),
            None => Invocation::Run(args),
        }),
        Err(EarlyExit {
            output,
            status: Ok(()),
        }) => Ok(Invocation::Exit(output)),
        Err(EarlyExit {
            output,
            status: Err(()),
        }) => error::ArgParseSnafu {
            message: output.trim_end(),
        }
        .fail(),
    }
}

/// Turns `--name=value` into `--name value`, which is the only form argh understands. Nothing
/// after a bare `--` is touched.
fn split_long_options<I>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut split = Vec::new();
    let mut options_done = false;
    for arg in raw {
        if options_done {
            split.push(arg);
            continue;
        }
        if arg == "--" {
            options_done = true;
            split.push(arg);
            continue;
        }
        match arg.strip_prefix("--").and_then(|rest| rest.split_once('=')) {
            Some((name, value)) if !name.is_empty() => {
                split.push(format!("--{}", name));
                split.push(value.to_string());
            }
            _ => split.push(arg),
        }
    }
    split
}

/// A repository directory given on the command line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Repository {
    /// The path as it is recorded in au.txt.
    pub(crate) path: String,
    pub(crate) cache_dir: PathBuf,
}

impl Repository {
    fn new(arg: &str) -> Result<Self> {
        let dir = expand_tilde(arg);
        ensure!(dir.is_dir(), error::RepositoryNotFoundSnafu { path: &dir });
        let cache_dir = dir.join(CACHE_DIRNAME);
        ensure!(
            cache_dir.is_dir(),
            error::RepositoryNotFoundSnafu { path: &cache_dir }
        );
        Ok(Self {
            path: dir.to_string_lossy().into_owned(),
            cache_dir,
        })
    }

    /// The repository as it appears after `=` in au.txt.
    pub(crate) fn value(&self) -> String {
        repository_value(&self.path)
    }
}

/// Validated settings for one run.
#[derive(Debug)]
pub(crate) struct Options {
    pub(crate) autxt: PathBuf,
    pub(crate) source: Repository,
    pub(crate) destination: Repository,
    pub(crate) default: Repository,
    /// Target AUs in the order given, duplicates removed.
    pub(crate) auids: Vec<Auid>,
    pub(crate) warn_if_missing: bool,
    pub(crate) assume_yes: bool,
}

impl Options {
    pub(crate) fn from_args(args: Args) -> Result<Self> {
        let [autxt, source, destination, default] =
            <[String; 4]>::try_from(args.paths).map_err(|paths| Error::ArgCount {
                count: paths.len(),
            })?;

        let autxt = expand_tilde(&autxt);
        ensure!(autxt.is_file(), error::AuTxtNotFoundSnafu { path: &autxt });
        let source = Repository::new(&source)?;
        let destination = Repository::new(&destination)?;
        let default = Repository::new(&default)?;

        let mut texts = args.auid;
        for file in &args.auids {
            texts.extend(read_auid_file(expand_tilde(file))?);
        }
        let mut seen = HashSet::new();
        let mut auids = Vec::new();
        for text in &texts {
            let auid: Auid = text.parse()?;
            if seen.insert(auid.clone()) {
                debug!(
                    "Target AU {} has plugin id '{}' and AU key '{}'",
                    auid,
                    auid.plugin_id(),
                    auid.au_key()
                );
                auids.push(auid);
            } else {
                debug!("Ignoring repeated AUID {}", auid);
            }
        }
        ensure!(!auids.is_empty(), error::NoTargetsSnafu);

        Ok(Self {
            autxt,
            source,
            destination,
            default,
            auids,
            warn_if_missing: args.warn_if_missing,
            assume_yes: args.yes,
        })
    }
}

/// Reads the AUIDs listed in an AUID file; a file with none is an error.
pub(crate) fn read_auid_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).context(error::AuidFileReadSnafu { path })?;
    let auids = auid_lines(&contents);
    ensure!(!auids.is_empty(), error::AuidFileEmptySnafu { path });
    Ok(auids)
}

/// One AUID per line; `#` starts a comment, and blank lines are ignored.
fn auid_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(|line| line.split_once('#').map_or(line, |(before, _)| before).trim())
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Expands a leading `~` or `~/` to the current user's home directory.
pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match home::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}
