//! Package engine error types

use std::io;
use thiserror::Error;

/// Package engine result type
pub type PkgResult<T> = Result<T, PkgError>;

/// Package engine errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PkgError {
    /// The external solver could not produce an environment
    #[error("solve failed: {0}")]
    Solve(String),

    /// Package archive could not be fetched
    #[error("archive not found: {0}")]
    MissingArchive(String),

    /// Package archive is malformed
    #[error("{0}")]
    InvalidArchive(String),

    /// Environment manifest is malformed or unreachable
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// A shared library failed to load
    #[error("failed to load shared library {path}: {reason}")]
    SharedLibrary { path: String, reason: String },

    /// A package needs a runtime the environment does not have
    #[error("{0} is not installed")]
    MissingRuntime(String),

    /// Named package is not in the installed set
    #[error("package not installed: {0}")]
    NotInstalled(String),

    /// Filesystem I/O error
    #[error("I/O error: {0}")]
    Io(String),
}

impl PkgError {
    /// Classify an error raised while installing the archive at `url`
    pub fn from_install(url: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => PkgError::MissingArchive(url.to_string()),
            io::ErrorKind::InvalidData => PkgError::InvalidArchive(format!("{}: {}", url, err)),
            _ => PkgError::Io(format!("{}: {}", url, err)),
        }
    }

    pub fn io(path: &str, err: io::Error) -> Self {
        PkgError::Io(format!("{}: {}", path, err))
    }
}

impl From<io::Error> for PkgError {
    fn from(e: io::Error) -> Self {
        PkgError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for PkgError {
    fn from(e: serde_json::Error) -> Self {
        PkgError::InvalidManifest(e.to_string())
    }
}
