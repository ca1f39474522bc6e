/// Error types for the scan pipeline.
///
/// Recoverable conditions (a directory we may not list, a security probe
/// that is unavailable) are absorbed where they occur and never reach this
/// type's consumers. Everything that does surface here is either fatal for
/// the scan or a misuse of the pipeline API.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the producer, the sinks and the coordinator.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found (typically removed while the scan was running).
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A path expected to be a directory is something else, either the
    /// scan root or a directory replaced while the scan was running.
    #[error("Path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// An operation was called in a state that does not allow it.
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// A pipeline party broke the producer/consumer protocol.
    #[error("Pipeline contract violated: {0}")]
    ContractViolation(String),

    /// A directory size does not fit the fixed-width placeholder.
    #[error("Size {value} does not fit the {width}-digit size field")]
    SizeFieldOverflow { value: String, width: usize },

    /// The record stream does not nest properly.
    #[error("Unbalanced record stream: {0}")]
    UnbalancedStream(&'static str),

    /// The thread owning the live document stopped draining its job queue.
    #[error("Document dispatcher is no longer running")]
    DispatcherClosed,

    /// The operation observed a cancellation request.
    ///
    /// Used internally to unwind workers; never reported as a failure.
    #[error("Operation cancelled")]
    Cancelled,

    /// A worker thread could not be spawned.
    #[error("Failed to spawn {thread} thread: {source}")]
    Spawn {
        thread: String,
        #[source]
        source: io::Error,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::NotADirectory => Self::NotADirectory { path },
            _ => Self::Io { path, source },
        }
    }

    /// Whether a listing or stat that failed with this error should skip the
    /// entry instead of aborting the scan.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied { .. } | Self::NotFound { .. } | Self::NotADirectory { .. }
        )
    }
}
