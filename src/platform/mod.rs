//! Platform glue
//!
//! Everything that only exists in the browser lives in [`web`]: the log
//! console channel, the local spawner and the wasm entry point helpers. The
//! rest of the crate is platform-agnostic and runs natively under test.

#[cfg(target_arch = "wasm32")]
#[cfg(target_os = "unknown")] // Browser WASM (no WASI)
pub mod web;

use thiserror::Error;

/// Name of the broadcast channel the log console listens on
pub const LOG_BROADCAST_CHANNEL: &str = "/xeus-kernel-logs-broadcast";

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Platform-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// A host API threw
    #[error("host error: {0}")]
    Host(String),
    #[error("encoding error: {0}")]
    Encode(String),
}
