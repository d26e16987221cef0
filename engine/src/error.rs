//! Error types for the offload engine.
//!
//! `EngineError` covers job-level and scheduler-level failures. Per-file
//! failures during a transfer or verification are recorded in the job report
//! as strings and never abort the job; inside the engines they travel as
//! `EngineError` values until they are caught at the file boundary.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used across the engine.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Source file or root does not exist
    #[error("Source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Failed to read from a source or destination file
    #[error("Failed to read file: {}: {source}", path.display())]
    ReadError { path: PathBuf, source: io::Error },

    /// Failed to write to a destination file
    #[error("Failed to write file: {}: {source}", path.display())]
    WriteError { path: PathBuf, source: io::Error },

    /// Failed to create a destination directory
    #[error("Failed to create directory: {}: {source}", path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// Pre-flight validation found paths that no longer exist
    #[error("{} path(s) referenced by queued jobs are missing", missing.len())]
    PreflightFailed { missing: Vec<PathBuf> },

    /// A manifest line could not be understood
    #[error("Invalid manifest line {line}: {reason}")]
    ManifestParse { line: usize, reason: String },

    /// Settings file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not valid in the current queue or job state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A scheduler, engine or post-processing thread could not be started
    #[error("Failed to start worker thread: {0}")]
    ThreadSpawn(#[source] io::Error),

    /// The scheduler thread is gone
    #[error("Scheduler is no longer running")]
    SchedulerClosed,

    /// Cancellation observed at a checkpoint
    #[error("Cancelled by user")]
    Cancelled,
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::DirectoryCreationFailed { source, .. }
            | Self::ThreadSpawn(source) => source.raw_os_error(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
