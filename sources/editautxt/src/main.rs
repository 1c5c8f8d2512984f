/*!
# Introduction

editautxt edits the LOCKSS daemon's `au.txt` file offline. It moves a set of archival units
(AUs) from one repository to another by rewriting their
`org.lockss.au.<plugin>.<key>.reserved.repository` lines, and gives AUs that only have a
`reserved.disabled` line an explicit assignment to a default repository.

Usage example:

```shell
$ editautxt --auids=auids.txt /cache0/gamma/config/au.txt /cache0/gamma /cache1/gamma /cache0/gamma
Are you sure the LOCKSS daemon is stopped? [yn] y
Are you REALLY sure the LOCKSS daemon is stopped?
Type yes only if you are absolutely certain.
yes
```

Each repository must be a directory with a `cache` subdirectory. Targets come from `--auid`
and from `--auids` files, which list one AUID per line with `#` comments.

Nothing is written unless every target is found (see `--warn-if-missing`) and every target that
has a repository line is currently in the source repository. Before `au.txt` is replaced, its
current contents are copied to the first free `au.txt.1`, `au.txt.2`, ...

The daemon must be stopped while this runs; you're asked to confirm that twice unless `--yes`
is given.
*/

#[macro_use]
extern crate log;

mod args;
mod auid;
mod autxt;
mod confirm;
mod error;

use args::{Invocation, Options};
use autxt::AuTxt;
use error::Result;
use simplelog::{Config as LogConfig, LevelFilter, SimpleLogger};
use snafu::ResultExt;
use std::env;
use std::io;
use std::process::ExitCode;

fn setup_logger(level: LevelFilter) -> Result<()> {
    SimpleLogger::init(level, LogConfig::default()).context(error::LoggerSnafu)
}

/// Reads `au.txt`, moves the target AUs and writes it back behind a backup. The file is left
/// alone if anything goes wrong before the backup.
fn edit_autxt(options: &Options) -> Result<()> {
    let mut autxt = AuTxt::read(&options.autxt)?;
    let resolution = autxt.resolve(
        &options.auids,
        &options.default.value(),
        options.warn_if_missing,
    )?;
    autxt.rewrite(
        &resolution.existing,
        &options.source.path,
        &options.destination.path,
    )?;

    let backup = autxt.backup()?;
    autxt.commit()?;
    info!(
        "Moved {} AUs to {}, assigned {} AUs to {}, skipped {}; previous contents are in '{}'",
        resolution.existing.len(),
        options.destination.path,
        resolution.appended.len(),
        options.default.path,
        resolution.missing.len(),
        backup.display()
    );
    Ok(())
}

fn run() -> Result<()> {
    let args = match args::parse_args(env::args())? {
        Invocation::Exit(text) => {
            println!("{}", text);
            return Ok(());
        }
        Invocation::Run(args) => args,
    };
    setup_logger(args.log_level())?;

    let options = Options::from_args(args)?;
    for repository in [&options.source, &options.destination, &options.default] {
        debug!("Repository cache found at '{}'", repository.cache_dir.display());
    }

    if options.assume_yes {
        info!("Not asking whether the daemon is stopped");
    } else {
        confirm::ask_daemon_stopped(&mut io::stdin().lock(), &mut io::stdout())?;
    }

    edit_autxt(&options)
}

// Snafu's Display output is what the operator should see, not the Debug form a Result from main
// would print.
fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            if e.is_usage() {
                eprintln!("Run with --help for usage.");
            }
            e.exit_code()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const AU_TXT: &str = "\
# AU Configuration
org.lockss.config.fileVersion.au=1
org.lockss.au.org|example|plugin.pid%3D1.reserved.repository=local\\:{src}
org.lockss.au.org|example|plugin.pid%3D1.title=First
org.lockss.au.org|example|plugin.pid%3D2.reserved.disabled=false
org.lockss.au.org|example|plugin.pid%3D3.reserved.repository=local\\:{dst}
";

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            for repo in &["src", "dst", "def"] {
                fs::create_dir_all(dir.path().join(repo).join("cache")).unwrap();
            }
            let fixture = Self { dir };
            fs::write(fixture.autxt(), fixture.expand(AU_TXT)).unwrap();
            fixture
        }

        fn repo(&self, name: &str) -> String {
            self.dir.path().join(name).display().to_string()
        }

        fn autxt(&self) -> std::path::PathBuf {
            self.dir.path().join("au.txt")
        }

        fn expand(&self, text: &str) -> String {
            text.replace("{src}", &self.repo("src"))
                .replace("{dst}", &self.repo("dst"))
                .replace("{def}", &self.repo("def"))
        }

        fn options(&self, flags: &[&str], source: &str, destination: &str) -> Options {
            let mut raw = vec!["editautxt".to_string(), "--yes".to_string()];
            raw.extend(flags.iter().map(|flag| flag.to_string()));
            raw.push(self.autxt().display().to_string());
            raw.push(self.repo(source));
            raw.push(self.repo(destination));
            raw.push(self.repo("def"));
            match args::parse_args(raw).unwrap() {
                Invocation::Run(args) => Options::from_args(args).unwrap(),
                other => panic!("expected arguments, got {:?}", other),
            }
        }
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn moves_and_assigns() {
        let fixture = Fixture::new();
        let options = fixture.options(
            &[
                "--auid=org.example.plugin&pid=1",
                "--auid=org.example.plugin&pid=2",
            ],
            "src",
            "dst",
        );
        assert!(options.assume_yes);
        edit_autxt(&options).unwrap();

        let expected = fixture.expand(
            "\
# AU Configuration
org.lockss.config.fileVersion.au=1
org.lockss.au.org|example|plugin.pid%3D1.reserved.repository=local\\:{dst}
org.lockss.au.org|example|plugin.pid%3D1.title=First
org.lockss.au.org|example|plugin.pid%3D2.reserved.disabled=false
org.lockss.au.org|example|plugin.pid%3D3.reserved.repository=local\\:{dst}
org.lockss.au.org|example|plugin.pid%3D2.reserved.repository=local\\:{def}
",
        );
        assert_eq!(read(&fixture.autxt()), expected);
        assert_eq!(
            read(&fixture.dir.path().join("au.txt.1")),
            fixture.expand(AU_TXT)
        );
    }

    #[test]
    fn mismatch_leaves_file_alone() {
        let fixture = Fixture::new();
        let options = fixture.options(
            &[
                "--auid=org.example.plugin&pid=1",
                "--auid=org.example.plugin&pid=3",
            ],
            "src",
            "def",
        );
        assert!(matches!(
            edit_autxt(&options),
            Err(error::Error::SourceMismatch { .. })
        ));
        assert_eq!(read(&fixture.autxt()), fixture.expand(AU_TXT));
        assert!(!fixture.dir.path().join("au.txt.1").exists());
    }

    #[test]
    fn not_found_leaves_file_alone() {
        let fixture = Fixture::new();
        let options = fixture.options(&["--auid=org.example.plugin&pid=9"], "src", "dst");
        assert!(matches!(
            edit_autxt(&options),
            Err(error::Error::AuidsNotFound { .. })
        ));
        assert_eq!(read(&fixture.autxt()), fixture.expand(AU_TXT));
        assert!(!fixture.dir.path().join("au.txt.1").exists());
    }

    #[test]
    fn not_found_tolerated() {
        let fixture = Fixture::new();
        let options = fixture.options(
            &[
                "--warn-if-missing",
                "--auid=org.example.plugin&pid=9",
                "--auid=org.example.plugin&pid=1",
            ],
            "src",
            "def",
        );
        edit_autxt(&options).unwrap();
        assert!(read(&fixture.autxt()).contains(&fixture.expand(
            "org.lockss.au.org|example|plugin.pid%3D1.reserved.repository=local\\:{def}\n"
        )));
    }

    #[test]
    fn mismatch_is_fatal_even_when_missing_is_tolerated() {
        let fixture = Fixture::new();
        let options = fixture.options(
            &[
                "--warn-if-missing",
                "--auid=org.example.plugin&pid=9",
                "--auid=org.example.plugin&pid=3",
            ],
            "src",
            "def",
        );
        assert!(matches!(
            edit_autxt(&options),
            Err(error::Error::SourceMismatch { .. })
        ));
        assert_eq!(read(&fixture.autxt()), fixture.expand(AU_TXT));
        assert!(!fixture.dir.path().join("au.txt.1").exists());
    }

    #[test]
    fn round_trip_makes_two_backups() {
        let fixture = Fixture::new();
        let auid = "--auid=org.example.plugin&pid=1";

        edit_autxt(&fixture.options(&[auid], "src", "def")).unwrap();
        let moved = read(&fixture.autxt());
        edit_autxt(&fixture.options(&[auid], "def", "src")).unwrap();

        assert_eq!(read(&fixture.autxt()), fixture.expand(AU_TXT));
        assert_eq!(
            read(&fixture.dir.path().join("au.txt.1")),
            fixture.expand(AU_TXT)
        );
        assert_eq!(read(&fixture.dir.path().join("au.txt.2")), moved);
    }
}
