//! Provides the list of errors for `editautxt`.

use snafu::Snafu;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum Error {
    #[snafu(display("Failed to parse arguments: {}", message))]
    ArgParse { message: String },

    #[snafu(display("expected 4 arguments, got {}", count))]
    ArgCount { count: usize },

    #[snafu(display("file not found: {}", path.display()))]
    AuTxtNotFound { path: PathBuf },

    #[snafu(display("Error: {} contains no meaningful lines", path.display()))]
    AuidFileEmpty { path: PathBuf },

    #[snafu(display("Failed to read AUID file '{}': {}", path.display(), source))]
    AuidFileRead { path: PathBuf, source: io::Error },

    #[snafu(display("AUIDs not found in {}:\n{}", path.display(), auids.join("\n")))]
    AuidsNotFound { path: PathBuf, auids: Vec<String> },

    #[snafu(display("Failed to back up '{}' to '{}': {}", from.display(), to.display(), source))]
    Backup {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[snafu(display("Operator declined to continue. Exiting."))]
    Declined,

    #[snafu(display("invalid AUID '{}': expected PLUGINID&AUKEY", auid))]
    InvalidAuid { auid: String },

    #[snafu(display("Failed to setup logger: {}", source))]
    Logger { source: log::SetLoggerError },

    #[snafu(display("at least one target AUID is required"))]
    NoTargets,

    #[snafu(display("Failed to read from terminal: {}", source))]
    PromptRead { source: io::Error },

    #[snafu(display("Failed to write to terminal: {}", source))]
    PromptWrite { source: io::Error },

    #[snafu(display("Failed to read '{}': {}", path.display(), source))]
    ReadAuTxt { path: PathBuf, source: io::Error },

    #[snafu(display("directory not found: {}", path.display()))]
    RepositoryNotFound { path: PathBuf },

    #[snafu(display("Failed to replace '{}': {}", path.display(), source))]
    ReplaceAuTxt {
        path: PathBuf,
        source: tempfile::PersistError,
    },

    #[snafu(display(
        "AUIDs not in {} in {}:\n{}",
        repository,
        path.display(),
        auids.join("\n")
    ))]
    SourceMismatch {
        repository: String,
        path: PathBuf,
        auids: Vec<String>,
    },

    #[snafu(display("Failed to write temporary file for '{}': {}", path.display(), source))]
    WriteAuTxt { path: PathBuf, source: io::Error },
}

impl Error {
    /// Usage errors are the ones the operator fixes by changing the command line.
    pub(crate) fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::ArgParse { .. }
                | Error::ArgCount { .. }
                | Error::AuTxtNotFound { .. }
                | Error::AuidFileEmpty { .. }
                | Error::InvalidAuid { .. }
                | Error::NoTargets
                | Error::RepositoryNotFound { .. }
        )
    }

    pub(crate) fn exit_code(&self) -> ExitCode {
        if self.is_usage() {
            ExitCode::from(2)
        } else {
            ExitCode::from(1)
        }
    }
}

pub(crate) type Result<T> = std::result::Result<T, Error>;
