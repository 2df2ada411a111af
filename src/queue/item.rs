//! Queue item state machine.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::{FormatSelection, UsageError};
use crate::config::Config;
use crate::engine::Engine;
use crate::metadata::Metadata;
use crate::task::{
    Completion, Dispatcher, DownloadOutcome, DownloadTask, ItemId, MetadataOutcome, MetadataTask,
    ProgressStatus,
};

/// Lifecycle state of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// Added, nothing requested yet.
    Created,
    /// Metadata task in flight.
    MetadataPending,
    /// Metadata resolved; ready to download.
    MetadataReady,
    /// Metadata could not be resolved.
    MetadataFailed,
    /// Download task in flight.
    DownloadPending,
    /// Payload downloaded.
    DownloadDone,
    /// Last download attempt failed; may be retried.
    DownloadFailed,
}

impl ItemState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::MetadataPending => "metadata_pending",
            Self::MetadataReady => "metadata_ready",
            Self::MetadataFailed => "metadata_failed",
            Self::DownloadPending => "download_pending",
            Self::DownloadDone => "download_done",
            Self::DownloadFailed => "download_failed",
        }
    }

    /// True while a task for the item is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::MetadataPending | Self::DownloadPending)
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress indication of an item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// Working, amount unknown (metadata resolution).
    Indeterminate,
    /// Fraction in `[0, 1]`.
    Fraction(f64),
}

impl Progress {
    #[must_use]
    pub fn fraction(&self) -> Option<f64> {
        match self {
            Self::Indeterminate => None,
            Self::Fraction(value) => Some(*value),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.fraction().is_some_and(|value| value >= 1.0)
    }
}

/// One URL in the queue.
///
/// Owns its own [`Config`] copy; metadata results rewrite it so later
/// downloads land in the item's folder and start from its sidecar.
pub struct QueueItem {
    id: ItemId,
    url: String,
    config: Config,
    state: ItemState,
    progress: Progress,
    metadata: Option<Metadata>,
    thumbnail: Option<PathBuf>,
    selection: FormatSelection,
    status_message: String,
    last_error: Option<String>,
    last_exit_code: Option<i32>,
    engine: Arc<dyn Engine>,
    dispatcher: Dispatcher,
}

impl fmt::Debug for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueItem")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("state", &self.state)
            .field("progress", &self.progress)
            .field("engine", &self.engine.name())
            .finish_non_exhaustive()
    }
}

impl QueueItem {
    #[must_use]
    pub fn new(
        id: ItemId,
        url: impl Into<String>,
        config: Config,
        engine: Arc<dyn Engine>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            id,
            url: url.into(),
            config,
            state: ItemState::Created,
            progress: Progress::Fraction(0.0),
            metadata: None,
            thumbnail: None,
            selection: FormatSelection::default(),
            status_message: String::new(),
            last_error: None,
            last_exit_code: None,
            engine,
            dispatcher,
        }
    }

    /// Starts metadata resolution.
    ///
    /// Resolution runs at most once per item: returns `false` (and does
    /// nothing) unless the item is freshly created. A failed item keeps its
    /// failure; the URL has to be added again to retry.
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(self), fields(item = %self.id, url = %self.url))]
    pub fn request_metadata(&mut self) -> bool {
        match self.state {
            ItemState::Created => {}
            ItemState::MetadataFailed => {
                let err = UsageError::MetadataFailed;
                warn!(reason = %err, "Metadata request ignored; add the URL again to retry");
                self.status_message = err.to_string();
                return false;
            }
            state => {
                debug!(state = %state, "Metadata already requested");
                return false;
            }
        }

        let task = MetadataTask::new(self.config.clone(), self.url.clone());
        task.spawn(
            Arc::clone(&self.engine),
            Completion::metadata(self.id, self.dispatcher.clone()),
        );
        self.state = ItemState::MetadataPending;
        self.progress = Progress::Indeterminate;
        "Fetching metadata".clone_into(&mut self.status_message);
        true
    }

    /// Starts a download with the current format choices.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a [`UsageError`] and leaves the item untouched (apart from
    /// its status message) when metadata is missing, a download is in
    /// flight, or the item is already downloaded.
    #[instrument(skip(self), fields(item = %self.id, url = %self.url))]
    pub fn request_download(&mut self) -> Result<(), UsageError> {
        if let Err(err) = self.check_downloadable() {
            warn!(state = %self.state, reason = %err, "Download request ignored");
            self.status_message = err.to_string();
            return Err(err);
        }

        let mut config = self.config.clone();
        let mut args = config.extra_engine_args.take().unwrap_or_default();
        args.extend(self.selection.engine_args());
        debug!(?args, "Frozen download arguments");
        config.extra_engine_args = Some(args);

        let task = DownloadTask::new(config, self.download_url());
        task.spawn(
            Arc::clone(&self.engine),
            Completion::download(self.id, self.dispatcher.clone()),
        );
        self.state = ItemState::DownloadPending;
        self.progress = Progress::Fraction(0.0);
        self.last_error = None;
        self.last_exit_code = None;
        "Downloading".clone_into(&mut self.status_message);
        Ok(())
    }

    fn check_downloadable(&self) -> Result<(), UsageError> {
        match self.state {
            ItemState::Created | ItemState::MetadataPending => Err(UsageError::MetadataNotReady),
            ItemState::MetadataFailed => Err(UsageError::MetadataFailed),
            ItemState::DownloadPending => Err(UsageError::DownloadInFlight),
            ItemState::DownloadDone => Err(UsageError::AlreadyDownloaded),
            ItemState::MetadataReady | ItemState::DownloadFailed if self.progress.is_complete() => {
                Err(UsageError::AlreadyDownloaded)
            }
            ItemState::MetadataReady | ItemState::DownloadFailed => Ok(()),
        }
    }

    fn download_url(&self) -> String {
        self.metadata
            .as_ref()
            .map(|meta| meta.original_url.as_str())
            .filter(|url| !url.is_empty())
            .unwrap_or(&self.url)
            .to_string()
    }

    /// Metadata is resolved, nothing is running and the item is not yet
    /// downloaded.
    #[must_use]
    pub fn is_ready_for_download(&self) -> bool {
        self.metadata.is_some() && self.check_downloadable().is_ok()
    }

    pub fn toggle_audio_only(&mut self, enabled: bool) {
        self.selection.set_audio_only(enabled);
    }

    /// # Errors
    ///
    /// Returns [`UsageError::UnknownChoice`] when `value` is not offered.
    pub fn select_audio_format(&mut self, value: &str) -> Result<(), UsageError> {
        self.selection.select_audio_format(value)
    }

    /// # Errors
    ///
    /// Returns [`UsageError::UnknownChoice`] when `value` is not offered.
    pub fn select_resolution(&mut self, value: &str) -> Result<(), UsageError> {
        self.selection.select_resolution(value)
    }

    /// # Errors
    ///
    /// Returns [`UsageError::UnknownChoice`] when `value` is not offered.
    pub fn select_video_ext(&mut self, value: &str) -> Result<(), UsageError> {
        self.selection.select_video_ext(value)
    }

    pub(crate) fn on_metadata_done(&mut self, outcome: MetadataOutcome) {
        if self.state != ItemState::MetadataPending {
            debug!(item = %self.id, state = %self.state, "Stale metadata outcome ignored");
            return;
        }
        match outcome {
            Ok(resolved) => {
                info!(item = %self.id, title = %resolved.metadata.title, "Item ready");
                self.selection.extend_from(&resolved.metadata.choices());
                self.config.download_root = resolved.record.folder;
                self.config.info_record_path = Some(resolved.record.sidecar_path);
                self.thumbnail = resolved.record.thumbnail_path;
                self.status_message =
                    format!("Ready to download: {}", self.config.download_root.display());
                self.metadata = Some(resolved.metadata);
                self.state = ItemState::MetadataReady;
                self.progress = Progress::Fraction(0.0);
            }
            Err(err) => {
                warn!(item = %self.id, url = %self.url, kind = err.kind(), error = %err, "Metadata failed");
                self.status_message = format!("Error: {err}");
                self.last_error = Some(err.to_string());
                self.state = ItemState::MetadataFailed;
                self.progress = Progress::Fraction(0.0);
            }
        }
    }

    pub(crate) fn on_download_progress(&mut self, status: ProgressStatus, fraction: f64) {
        if self.state != ItemState::DownloadPending {
            debug!(item = %self.id, state = %self.state, "Stale progress ignored");
            return;
        }
        self.progress = Progress::Fraction(fraction);
        self.status_message = format!("{status}: {:.1}%", fraction * 100.0);
    }

    pub(crate) fn on_download_done(&mut self, outcome: DownloadOutcome) {
        if self.state != ItemState::DownloadPending {
            debug!(item = %self.id, state = %self.state, "Stale download outcome ignored");
            return;
        }
        self.last_exit_code = Some(outcome.exit_code);
        if outcome.is_success() {
            info!(item = %self.id, folder = %self.config.download_root.display(), "Item downloaded");
            self.state = ItemState::DownloadDone;
            self.progress = Progress::Fraction(1.0);
            self.status_message = format!(
                "File downloaded in: {}",
                self.config.download_root.display()
            );
            return;
        }

        let message = outcome.message();
        warn!(
            item = %self.id,
            exit_code = outcome.exit_code,
            error = %message,
            "Download failed"
        );
        self.status_message = if message.is_empty() {
            format!("Failed to download (exit code {})", outcome.exit_code)
        } else {
            format!("Failed to download (exit code {}): {message}", outcome.exit_code)
        };
        self.last_error = Some(message).filter(|m| !m.is_empty());
        self.state = ItemState::DownloadFailed;
        self.progress = Progress::Fraction(0.0);
    }

    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn state(&self) -> ItemState {
        self.state
    }

    #[must_use]
    pub fn progress(&self) -> Progress {
        self.progress
    }

    #[must_use]
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.metadata.as_ref().map(|meta| meta.title.as_str())
    }

    #[must_use]
    pub fn thumbnail(&self) -> Option<&Path> {
        self.thumbnail.as_deref()
    }

    #[must_use]
    pub fn selection(&self) -> &FormatSelection {
        &self.selection
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Human-readable status of the last event.
    #[must_use]
    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn last_exit_code(&self) -> Option<i32> {
        self.last_exit_code
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::engine::{DownloadSource, EngineError, ProgressSink};
    use crate::metadata::FormatDescriptor;
    use crate::options::EngineOptions;
    use crate::sidecar::FinalizedRecord;
    use crate::task::{ResolvedMetadata, TaskError};
    use async_trait::async_trait;

    /// Engine whose tasks never get polled in these synchronous tests.
    struct InertEngine;

    #[async_trait]
    impl Engine for InertEngine {
        fn name(&self) -> &'static str {
            "inert"
        }

        async fn resolve(&self, _url: &str, _options: &EngineOptions) -> Result<Metadata, EngineError> {
            Err(EngineError::failed("inert"))
        }

        async fn download(
            &self,
            _source: &DownloadSource,
            _options: &EngineOptions,
            _progress: &mut dyn ProgressSink,
        ) -> Result<i32, EngineError> {
            Ok(0)
        }
    }

    fn item() -> QueueItem {
        let (dispatcher, _rx) = Dispatcher::channel();
        QueueItem::new(
            ItemId::new(1),
            "https://example.com/v",
            Config::new("/dl"),
            Arc::new(InertEngine),
            dispatcher,
        )
    }

    fn resolved() -> ResolvedMetadata {
        let formats = vec![FormatDescriptor {
            resolution: Some("1280x720".to_string()),
            video_ext: Some("mp4".to_string()),
            audio_ext: Some("none".to_string()),
            width: Some(serde_json::Number::from(1280)),
            extra: serde_json::Map::new(),
        }];
        ResolvedMetadata {
            metadata: Metadata::new("Song", "https://example.com/watch?v=1", formats),
            record: FinalizedRecord {
                folder: PathBuf::from("/dl/Song"),
                sidecar_path: PathBuf::from("/dl/Song/Song.json"),
                thumbnail_path: Some(PathBuf::from("/dl/Song/Song.png")),
            },
        }
    }

    #[tokio::test]
    async fn test_request_metadata_only_once() {
        let mut item = item();
        assert!(item.request_metadata());
        assert_eq!(item.state(), ItemState::MetadataPending);
        assert_eq!(item.progress(), Progress::Indeterminate);
        assert!(!item.request_metadata());
    }

    #[tokio::test]
    async fn test_request_download_before_metadata_is_refused() {
        let mut item = item();
        assert_eq!(item.request_download(), Err(UsageError::MetadataNotReady));
        item.request_metadata();
        assert_eq!(item.request_download(), Err(UsageError::MetadataNotReady));
        assert_eq!(item.state(), ItemState::MetadataPending);
        assert_eq!(item.status_message(), "metadata is not available yet");
    }

    #[tokio::test]
    async fn test_metadata_success_updates_config_and_choices() {
        let mut item = item();
        item.request_metadata();
        item.on_metadata_done(Ok(resolved()));

        assert_eq!(item.state(), ItemState::MetadataReady);
        assert_eq!(item.config().download_root, PathBuf::from("/dl/Song"));
        assert_eq!(
            item.config().info_record_path,
            Some(PathBuf::from("/dl/Song/Song.json"))
        );
        assert_eq!(item.thumbnail(), Some(Path::new("/dl/Song/Song.png")));
        assert_eq!(item.selection().resolution().offered(), ["best", "1280x720"]);
        assert!(item.is_ready_for_download());
    }

    #[tokio::test]
    async fn test_metadata_failure_blocks_download() {
        let mut item = item();
        item.request_metadata();
        item.on_metadata_done(Err(TaskError::Resolution(EngineError::failed("Unsupported URL"))));

        assert_eq!(item.state(), ItemState::MetadataFailed);
        assert!(!item.is_ready_for_download());
        assert_eq!(item.request_download(), Err(UsageError::MetadataFailed));
        assert_eq!(item.status_message(), "metadata could not be resolved");
    }

    #[tokio::test]
    async fn test_failed_metadata_is_not_requested_again() {
        let mut item = item();
        assert!(item.request_metadata());
        item.on_metadata_done(Err(TaskError::Resolution(EngineError::failed("timed out"))));
        assert_eq!(item.last_error(), Some("metadata resolution failed: timed out"));

        assert!(!item.request_metadata());
        assert_eq!(item.state(), ItemState::MetadataFailed);
        assert_eq!(item.status_message(), "metadata could not be resolved");
        assert_eq!(item.last_error(), Some("metadata resolution failed: timed out"));

        // a stray outcome cannot revive the item either
        item.on_metadata_done(Ok(resolved()));
        assert_eq!(item.state(), ItemState::MetadataFailed);
        assert!(item.metadata().is_none());
    }

    #[tokio::test]
    async fn test_download_lifecycle_and_completion_lock() {
        let mut item = item();
        item.request_metadata();
        item.on_metadata_done(Ok(resolved()));

        item.request_download().unwrap();
        assert_eq!(item.state(), ItemState::DownloadPending);
        assert_eq!(item.request_download(), Err(UsageError::DownloadInFlight));

        item.on_download_progress(ProgressStatus::Downloading, 0.5);
        assert_eq!(item.progress(), Progress::Fraction(0.5));
        assert_eq!(item.status_message(), "downloading: 50.0%");
        item.on_download_progress(ProgressStatus::Finished, 1.0);
        item.on_download_done(DownloadOutcome::success());

        assert_eq!(item.state(), ItemState::DownloadDone);
        assert!(item.progress().is_complete());
        assert_eq!(item.status_message(), "File downloaded in: /dl/Song");
        assert!(!item.is_ready_for_download());
        assert_eq!(item.request_download(), Err(UsageError::AlreadyDownloaded));
    }

    #[tokio::test]
    async fn test_failed_download_can_be_retried_without_accumulating_args() {
        let mut item = item();
        item.request_metadata();
        item.on_metadata_done(Ok(resolved()));

        item.request_download().unwrap();
        item.on_download_done(DownloadOutcome::exited(1));
        assert_eq!(item.state(), ItemState::DownloadFailed);
        assert_eq!(item.last_exit_code(), Some(1));
        assert_eq!(item.status_message(), "Failed to download (exit code 1)");
        assert!(item.is_ready_for_download());

        item.request_download().unwrap();
        assert!(item.config().extra_engine_args.is_none());
    }

    #[tokio::test]
    async fn test_stale_events_are_ignored() {
        let mut item = item();
        item.on_download_progress(ProgressStatus::Downloading, 0.3);
        item.on_download_done(DownloadOutcome::success());
        assert_eq!(item.state(), ItemState::Created);
        assert_eq!(item.progress(), Progress::Fraction(0.0));
    }
}
