//! mediaq core library
//!
//! Orchestration layer of a queue-driven yt-dlp front-end: every queued URL
//! is a [`QueueItem`] that first resolves its metadata (persisting a JSON
//! sidecar and thumbnail under `<root>/<title>/`) and then downloads the
//! payload with the chosen format. Each step runs as its own Tokio task and
//! reports back over a single event channel drained by the [`Queue`] owner.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Per-item configuration and download-root handling
//! - [`options`] - Typed engine options: parse, diff, render
//! - [`metadata`] - Resolved metadata and derived format choices
//! - [`engine`] - Engine boundary and the `yt-dlp` implementation
//! - [`sidecar`] - Metadata record persistence
//! - [`task`] - Worker tasks and the event channel
//! - [`queue`] - Queue items and the queue

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod engine;
pub mod metadata;
pub mod options;
pub mod queue;
pub mod sidecar;
pub mod task;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use engine::{DownloadSource, Engine, EngineError, ProgressEvent, ProgressSink, YtDlpEngine};
pub use metadata::{FormatChoices, FormatDescriptor, Metadata};
pub use options::{EngineOptions, OptionsDelta, OptionsError, diff};
pub use queue::{FormatSelection, ItemState, Progress, Queue, QueueItem, UsageError};
pub use sidecar::SidecarError;
pub use task::{DownloadOutcome, ItemId, ProgressStatus, TaskError, TaskEvent};
