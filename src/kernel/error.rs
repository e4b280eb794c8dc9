//! Kernel error types

use crate::pkg::PkgError;
use crate::protocol::ProtocolError;
use thiserror::Error;

/// Kernel result type
pub type KernelResult<T> = Result<T, KernelError>;

/// Errors raised by the worker half and surfaced through the controller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    /// Numeric fault raised across the interpreter boundary
    #[error("{message}")]
    InterpreterFault { code: i32, message: String },

    /// Interpreter failed with a textual error
    #[error("interpreter error: {0}")]
    Interpreter(String),

    /// Interpreter binary could not be loaded
    #[error("failed to load interpreter: {0}")]
    Load(String),

    /// `initialize` was called a second time
    #[error("kernel already initialized")]
    AlreadyInitialized,

    /// The worker thread is gone
    #[error("worker terminated")]
    WorkerGone,

    #[error(transparent)]
    Package(#[from] PkgError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Filesystem error outside the package engine
    #[error("I/O error: {0}")]
    Io(String),
}

impl KernelError {
    pub fn io(path: &str, err: std::io::Error) -> Self {
        KernelError::Io(format!("{}: {}", path, err))
    }
}
