//! The `au.txt` file: reading it once, finding the line that records each target AU's
//! repository, rewriting those lines, and writing the result back behind a numbered backup.

use crate::auid::{Auid, Reserved, ReservedEntry, Skip, AUID_DELIMITER, RESERVED_MARKER};
use crate::error::{self, Result};
use snafu::{ensure, ResultExt};
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::os::unix::fs::{self as unix_fs, MetadataExt};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Every repository value in `au.txt` starts with this, colon already escaped.
pub(crate) const REPOSITORY_SCHEME: &str = r"local\:";

/// Encodes a repository path the way the daemon writes it after `=`.
///
/// `au.txt` is a Java properties file, so backslashes, colons and equals signs in the path are
/// escaped with a backslash.
pub(crate) fn repository_value(path: &str) -> String {
    let mut value = String::with_capacity(REPOSITORY_SCHEME.len() + path.len());
    value.push_str(REPOSITORY_SCHEME);
    for c in path.chars() {
        if matches!(c, '\\' | ':' | '=') {
            value.push('\\');
        }
        value.push(c);
    }
    value
}

/// Where a target AU's repository assignment lives.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    /// Index of its `...reserved.repository=` line.
    Line(usize),
    /// Only a `...reserved.disabled=` line was seen; the default repository applies. The key
    /// prefix is kept so a new line can spell the AU exactly like the file already does.
    Unassigned { key_prefix: String },
}

/// What happened to each target during resolution.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Resolution {
    /// Targets that already have a repository line, in target order.
    pub(crate) existing: Vec<(Auid, usize)>,
    /// Targets given a new default-repository line, in target order.
    pub(crate) appended: Vec<(Auid, usize)>,
    /// Targets not mentioned in the file; only non-empty when missing AUs are tolerated.
    pub(crate) missing: Vec<Auid>,
}

#[derive(Debug)]
pub(crate) struct AuTxt {
    path: PathBuf,
    /// The file exactly as it was read; this is what gets backed up.
    contents: String,
    lines: Vec<String>,
}

impl AuTxt {
    /// Loads the file as a list of lines, without their terminators.
    pub(crate) fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).context(error::ReadAuTxtSnafu { path })?;
        let lines: Vec<String> = contents.lines().map(str::to_string).collect();
        debug!("Read {} lines from '{}'", lines.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            contents,
            lines,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_lines<P, I, S>(path: P, lines: I) -> Self
    where
        P: Into<PathBuf>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        let contents = lines.iter().map(|line| format!("{}\n", line)).collect();
        Self {
            path: path.into(),
            contents,
            lines,
        }
    }

    #[cfg(test)]
    pub(crate) fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Scans the file once, in order, and records where each target's repository is set.
    ///
    /// A `repository` line always replaces whatever was recorded before it. A `disabled` line
    /// is only recorded if nothing is known about the AU yet, so it never hides a repository
    /// line that came earlier in the file.
    fn index_targets(&self, targets: &[Auid]) -> HashMap<Auid, Slot> {
        let wanted: HashSet<&Auid> = targets.iter().collect();
        let mut slots = HashMap::new();

        for (i, line) in self.lines.iter().enumerate() {
            if !line.contains(RESERVED_MARKER) {
                continue;
            }
            let entry = match ReservedEntry::parse(line) {
                Ok(entry) => entry,
                Err(Skip::AmbiguousPluginId) => {
                    warn!(
                        "Line {} of '{}' has a plugin id containing '{}', which can't be matched \
                         to an AUID; ignoring it",
                        i + 1,
                        self.path.display(),
                        AUID_DELIMITER
                    );
                    continue;
                }
                Err(Skip::NotReserved) => {
                    trace!("Line {} is not a reserved AU key", i + 1);
                    continue;
                }
            };

            let auid = entry.auid();
            if !wanted.contains(&auid) {
                continue;
            }
            match entry.reserved {
                Reserved::Disabled => {
                    trace!("Line {}: {} has no repository", i + 1, auid);
                    slots.entry(auid).or_insert_with(|| Slot::Unassigned {
                        key_prefix: entry.key_prefix.to_string(),
                    });
                }
                Reserved::Repository => {
                    trace!("Line {}: {} has a repository", i + 1, auid);
                    slots.insert(auid, Slot::Line(i));
                }
            }
        }

        slots
    }

    /// Finds the repository line of every target.
    ///
    /// Targets that only have a `disabled` line get a new line appended, in target order,
    /// assigning them `default_value`. Targets that are not in the file at all are an error
    /// unless `warn_if_missing` is set, in which case they're logged and left out.
    pub(crate) fn resolve(
        &mut self,
        targets: &[Auid],
        default_value: &str,
        warn_if_missing: bool,
    ) -> Result<Resolution> {
        let mut slots = self.index_targets(targets);

        let missing: Vec<Auid> = targets
            .iter()
            .filter(|auid| !slots.contains_key(*auid))
            .cloned()
            .collect();
        if !missing.is_empty() {
            ensure!(
                warn_if_missing,
                error::AuidsNotFoundSnafu {
                    path: &self.path,
                    auids: missing.iter().map(Auid::to_string).collect::<Vec<_>>(),
                }
            );
            for auid in &missing {
                warn!("AUID not found in '{}': {}", self.path.display(), auid);
            }
        }

        let mut resolution = Resolution {
            missing,
            ..Default::default()
        };
        for auid in targets {
            match slots.remove(auid) {
                Some(Slot::Line(index)) => resolution.existing.push((auid.clone(), index)),
                Some(Slot::Unassigned { key_prefix }) => {
                    let index = self.lines.len();
                    self.lines.push(format!(
                        "{}{}repository={}",
                        key_prefix, RESERVED_MARKER, default_value
                    ));
                    info!("Assigning {} to the default repository", auid);
                    resolution.appended.push((auid.clone(), index));
                }
                None => {}
            }
        }

        Ok(resolution)
    }

    /// Moves every line in `existing` from the `source` repository to `destination`.
    ///
    /// All lines are checked before any is changed; if any of them isn't currently in `source`,
    /// every such AU is reported and nothing is modified.
    pub(crate) fn rewrite(
        &mut self,
        existing: &[(Auid, usize)],
        source: &str,
        destination: &str,
    ) -> Result<()> {
        let source_value = repository_value(source);
        let destination_value = repository_value(destination);

        let mismatched: Vec<String> = existing
            .iter()
            .filter(|(_, index)| value_of(&self.lines[*index]) != Some(source_value.as_str()))
            .map(|(auid, _)| auid.to_string())
            .collect();
        ensure!(
            mismatched.is_empty(),
            error::SourceMismatchSnafu {
                repository: source,
                path: &self.path,
                auids: mismatched,
            }
        );

        for (auid, index) in existing {
            let line = &mut self.lines[*index];
            let key = line.split_once('=').map_or(line.as_str(), |(key, _)| key);
            *line = format!("{}={}", key, destination_value);
            info!("Moving {} to {}", auid, destination);
        }

        Ok(())
    }

    /// Writes the contents that were read to the first of `PATH.1`, `PATH.2`, ... that doesn't
    /// exist yet. The backup gets the mode and owner of `PATH`.
    pub(crate) fn backup(&self) -> Result<PathBuf> {
        let mut n: u32 = 1;
        loop {
            let candidate = backup_path(&self.path, n);
            let mut backup = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    n += 1;
                    continue;
                }
                Err(e) => {
                    return Err(e).context(error::BackupSnafu {
                        from: &self.path,
                        to: &candidate,
                    })
                }
            };

            let context = || error::BackupSnafu {
                from: &self.path,
                to: &candidate,
            };
            backup
                .write_all(self.contents.as_bytes())
                .with_context(|_| context())?;
            copy_attributes(&backup, &self.path).with_context(|_| context())?;
            backup.sync_all().with_context(|_| context())?;

            info!(
                "Backed up '{}' to '{}'",
                self.path.display(),
                candidate.display()
            );
            return Ok(candidate);
        }
    }

    /// Replaces the file on disk with the in-memory lines, each ending in a newline.
    ///
    /// The new contents go to a temporary file next to the original which is then renamed over
    /// it, so a failed write never leaves a truncated `au.txt` behind. The temporary file is
    /// first given the mode and owner of the file it replaces.
    pub(crate) fn commit(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let context = || error::WriteAuTxtSnafu { path: &self.path };

        let mut temp = NamedTempFile::new_in(dir).with_context(|_| context())?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            for line in &self.lines {
                writeln!(writer, "{}", line).with_context(|_| context())?;
            }
            writer.flush().with_context(|_| context())?;
        }

        copy_attributes(temp.as_file(), &self.path).with_context(|_| context())?;
        temp.as_file().sync_all().with_context(|_| context())?;

        temp.persist(&self.path)
            .context(error::ReplaceAuTxtSnafu { path: &self.path })?;
        debug!("Wrote {} lines to '{}'", self.lines.len(), self.path.display());
        Ok(())
    }
}

/// The value half of a `key=value` line, without trailing whitespace.
fn value_of(line: &str) -> Option<&str> {
    line.split_once('=').map(|(_, value)| value.trim_end())
}

/// Gives `file` the owner and mode of the file at `path`.
fn copy_attributes(file: &File, path: &Path) -> io::Result<()> {
    let wanted = fs::metadata(path)?;
    let current = file.metadata()?;
    // Changing the owner can clear setuid/setgid bits, so it goes before the mode.
    if (current.uid(), current.gid()) != (wanted.uid(), wanted.gid()) {
        unix_fs::fchown(file, Some(wanted.uid()), Some(wanted.gid()))?;
    }
    file.set_permissions(wanted.permissions())
}

fn backup_path(path: &Path, n: u32) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".{}", n));
    PathBuf::from(name)
}
