//! Payload download task and progress normalization.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::{Completion, Dispatcher, ItemId, TaskError, TaskEvent, spawn_task};
use crate::config::Config;
use crate::engine::{DownloadSource, Engine, ProgressEvent, ProgressSink};
use crate::options::{EngineOptions, OptionsError, merge_user_args};

/// Largest fraction a still-running download may report.
const MAX_IN_FLIGHT_FRACTION: f64 = 1.0 - f64::EPSILON;

/// Normalized download status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Downloading,
    Finished,
    Error,
}

impl ProgressStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Finished => "finished",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps an engine progress event to `(status, fraction)`.
///
/// - `downloading` with a percent string: `percent / 100`, clamped below 1.0
/// - `finished`: 1.0
/// - `error`: 0.0
///
/// Anything else, and percent strings that do not parse, yield `None`.
#[must_use]
pub fn normalize_progress(event: &ProgressEvent) -> Option<(ProgressStatus, f64)> {
    match event.status.as_str() {
        "downloading" => {
            let percent = parse_percent(event.percent_str.as_deref()?)?;
            let fraction = (percent / 100.0).clamp(0.0, MAX_IN_FLIGHT_FRACTION);
            Some((ProgressStatus::Downloading, fraction))
        }
        "finished" => Some((ProgressStatus::Finished, 1.0)),
        "error" => Some((ProgressStatus::Error, 0.0)),
        _ => None,
    }
}

fn parse_percent(text: &str) -> Option<f64> {
    let cleaned = strip_ansi(text);
    let value: f64 = cleaned.trim().trim_end_matches('%').trim().parse().ok()?;
    value.is_finite().then_some(value)
}

/// Drops terminal color sequences (`ESC [ ... letter`).
fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Forwards normalized progress to the controlling task.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    item: ItemId,
    dispatcher: Dispatcher,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(item: ItemId, dispatcher: Dispatcher) -> Self {
        Self { item, dispatcher }
    }
}

impl ProgressSink for ProgressReporter {
    fn on_progress(&mut self, event: ProgressEvent) {
        if let Some((status, fraction)) = normalize_progress(&event) {
            self.dispatcher.dispatch(TaskEvent::DownloadProgress {
                item: self.item,
                status,
                fraction,
            });
        } else {
            debug!(item = %self.item, status = %event.status, "Ignoring progress event");
        }
    }
}

/// Outcome delivered by a [`DownloadTask`].
///
/// `exit_code` is the engine's exit code, `-1` when the engine failed
/// before producing one.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub exit_code: i32,
    pub error: Option<TaskError>,
}

impl DownloadOutcome {
    #[must_use]
    pub fn success() -> Self {
        Self {
            exit_code: 0,
            error: None,
        }
    }

    #[must_use]
    pub fn exited(exit_code: i32) -> Self {
        Self {
            exit_code,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: TaskError) -> Self {
        Self {
            exit_code: -1,
            error: Some(error),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }

    /// Failure message, empty for plain non-zero exits and successes.
    #[must_use]
    pub fn message(&self) -> String {
        self.error.as_ref().map(ToString::to_string).unwrap_or_default()
    }
}

/// Downloads the payload for one item.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    config: Config,
    url: String,
}

impl DownloadTask {
    #[must_use]
    pub fn new(config: Config, url: impl Into<String>) -> Self {
        Self {
            config,
            url: url.into(),
        }
    }

    /// Engine options for the transfer.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError`] when the extra engine arguments are malformed.
    pub fn options(&self) -> Result<EngineOptions, OptionsError> {
        let mut options = merge_user_args(self.config.extra_engine_args.as_deref())?;
        options.paths_home = Some(self.config.download_root.clone());
        options.no_playlist = true;
        options.quiet = true;
        options.no_progress = true;
        Ok(options)
    }

    /// The persisted record when there is one, the URL otherwise.
    #[must_use]
    pub fn source(&self) -> DownloadSource {
        match &self.config.info_record_path {
            Some(path) => DownloadSource::InfoJson(path.clone()),
            None => DownloadSource::Url(self.url.clone()),
        }
    }

    /// Runs the transfer to completion.
    #[instrument(skip(self, engine, progress), fields(url = %self.url, engine = engine.name()))]
    pub async fn run(self, engine: Arc<dyn Engine>, mut progress: ProgressReporter) -> DownloadOutcome {
        let options = match self.options() {
            Ok(options) => options,
            Err(err) => return DownloadOutcome::failed(err.into()),
        };
        let source = self.source();
        debug!(?source, "Starting download");

        match engine.download(&source, &options, &mut progress).await {
            Ok(0) => {
                info!("Download finished");
                DownloadOutcome::success()
            }
            Ok(code) => {
                warn!(exit_code = code, "Engine exited with failure");
                DownloadOutcome::exited(code)
            }
            Err(err) => {
                warn!(error = %err, "Download failed");
                DownloadOutcome::failed(TaskError::Download(err))
            }
        }
    }

    /// Spawns the task; progress and the outcome arrive through the
    /// completion's dispatcher.
    pub fn spawn(
        self,
        engine: Arc<dyn Engine>,
        completion: Completion<DownloadOutcome>,
    ) -> JoinHandle<()> {
        let reporter = ProgressReporter::new(completion.item(), completion.dispatcher().clone());
        spawn_task(completion, self.run(engine, reporter), DownloadOutcome::failed)
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}
