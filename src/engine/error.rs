//! Error types for engine invocations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while driving the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine program could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// IO error while talking to a running engine.
    #[error("engine IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine reported a failure.
    #[error("{message}")]
    Failed {
        /// Engine-provided message, usually its last `ERROR:` line.
        message: String,
    },

    /// The engine printed metadata that could not be parsed.
    #[error("invalid metadata from engine: {0}")]
    InvalidMetadata(#[from] serde_json::Error),
}

impl EngineError {
    /// Creates a failure from an engine message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}
