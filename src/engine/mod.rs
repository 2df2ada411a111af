//! Boundary to the media extraction/download engine.
//!
//! The orchestration layer never talks to yt-dlp directly; it goes through
//! the [`Engine`] trait so tasks can be driven by the process-backed
//! [`YtDlpEngine`] in production and by scripted engines in tests.
//!
//! # Architecture
//!
//! - [`Engine`] - Async trait with the two entry operations
//! - [`ProgressEvent`] - Engine-native progress report, before normalization
//! - [`ProgressSink`] - Receiver for progress events during a download
//! - [`DownloadSource`] - What a download is driven from
//! - [`YtDlpEngine`] - `yt-dlp` child-process implementation

mod error;
mod ytdlp;

pub use error::EngineError;
pub use ytdlp::{PROGRESS_TEMPLATE, YtDlpEngine, parse_progress_line};

use std::path::PathBuf;

use async_trait::async_trait;

use crate::metadata::Metadata;
use crate::options::EngineOptions;

/// Progress report as emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Engine status (`downloading`, `finished`, `error`, ...).
    pub status: String,
    /// Percentage text such as `" 42.5%"`, when the engine knows it.
    pub percent_str: Option<String>,
}

impl ProgressEvent {
    #[must_use]
    pub fn new(status: impl Into<String>, percent_str: Option<&str>) -> Self {
        Self {
            status: status.into(),
            percent_str: percent_str.map(str::to_string),
        }
    }
}

/// Receives engine progress events for one download.
pub trait ProgressSink: Send {
    fn on_progress(&mut self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(ProgressEvent) + Send,
{
    fn on_progress(&mut self, event: ProgressEvent) {
        self(event);
    }
}

/// What a download is driven from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadSource {
    /// Resolve and download the URL in one go.
    Url(String),
    /// Download from a previously written metadata record.
    InfoJson(PathBuf),
}

/// A media engine able to resolve URLs and download payloads.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    /// Resolves `url` into metadata.
    ///
    /// With `options.write_thumbnail` set the engine also writes the
    /// thumbnail under `options.paths_home` using `options.thumbnail_template`.
    async fn resolve(&self, url: &str, options: &EngineOptions) -> Result<Metadata, EngineError>;

    /// Downloads the payload, reporting progress to `progress`.
    ///
    /// Returns the engine's exit code; `0` is success.
    async fn download(
        &self,
        source: &DownloadSource,
        options: &EngineOptions,
        progress: &mut dyn ProgressSink,
    ) -> Result<i32, EngineError>;
}
