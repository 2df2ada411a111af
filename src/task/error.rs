//! Error type for everything a worker task can report.

use thiserror::Error;

use crate::engine::EngineError;
use crate::options::OptionsError;
use crate::sidecar::SidecarError;

/// Failure reported by a metadata or download task.
///
/// Every worker failure is converted into one of these at the worker
/// boundary; nothing escapes a task as a panic.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The user's extra engine arguments were malformed.
    #[error("invalid engine options: {0}")]
    Options(#[from] OptionsError),

    /// The engine could not resolve the URL.
    #[error("metadata resolution failed: {0}")]
    Resolution(#[source] EngineError),

    /// Metadata resolved but could not be written or moved into place.
    #[error("failed to persist metadata: {0}")]
    Persistence(#[from] SidecarError),

    /// The engine failed while transferring the payload.
    #[error("{0}")]
    Download(#[source] EngineError),

    /// The worker panicked or was cancelled by the runtime.
    #[error("task aborted: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Short kind label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Options(_) => "options",
            Self::Resolution(_) => "resolution",
            Self::Persistence(_) => "persistence",
            Self::Download(_) => "download",
            Self::Panicked(_) => "panicked",
        }
    }
}
