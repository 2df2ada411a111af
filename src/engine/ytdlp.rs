//! `yt-dlp` child-process engine.
//!
//! Metadata is obtained with `--dump-single-json`; downloads print one
//! machine-readable line per engine progress report through
//! `--progress-template`, which stands in for the library's progress hook.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace};

use super::{DownloadSource, Engine, EngineError, ProgressEvent, ProgressSink};
use crate::metadata::Metadata;
use crate::options::EngineOptions;

/// Marker that starts every progress line we ask the engine to print.
const PROGRESS_MARKER: &str = "[mediaq] ";

/// Progress template handed to `--progress-template`.
pub const PROGRESS_TEMPLATE: &str =
    "download:[mediaq] %(progress.status)s|%(progress._percent_str)s";

/// Prefix of engine error lines on stderr.
const ERROR_PREFIX: &str = "ERROR:";

/// Default program name looked up in `PATH`.
const DEFAULT_PROGRAM: &str = "yt-dlp";

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Engine backed by the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    program: PathBuf,
    /// Arguments placed before the engine options, e.g. `-m yt_dlp` when
    /// the program is a Python interpreter.
    launcher_args: Vec<String>,
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlpEngine {
    /// Uses `yt-dlp` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program(DEFAULT_PROGRAM)
    }

    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            launcher_args: Vec::new(),
        }
    }

    /// Builds an engine from a launcher command line such as
    /// `python3 -m yt_dlp`. Returns `None` for a blank command.
    #[must_use]
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next()?;
        Some(Self::with_program(program).with_launcher_args(parts.map(str::to_string).collect()))
    }

    #[must_use]
    pub fn with_launcher_args(mut self, args: Vec<String>) -> Self {
        self.launcher_args = args;
        self
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Full argument list for a metadata resolution.
    #[must_use]
    pub fn resolve_args(&self, url: &str, options: &EngineOptions) -> Vec<String> {
        let mut args = self.launcher_args.clone();
        args.extend(options.to_args());
        args.push("--dump-single-json".to_string());
        // -J implies simulation, which would also skip the thumbnail.
        if options.skip_download && options.write_thumbnail {
            args.push("--no-simulate".to_string());
        }
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    /// Full argument list for a payload download.
    #[must_use]
    pub fn download_args(&self, source: &DownloadSource, options: &EngineOptions) -> Vec<String> {
        let mut options = options.clone();
        // The template lines are our progress channel.
        options.no_progress = false;
        if matches!(source, DownloadSource::InfoJson(_)) {
            options.info_json = None;
        }

        let mut args = self.launcher_args.clone();
        args.extend(options.to_args());
        args.extend(
            ["--progress", "--newline", "--progress-template", PROGRESS_TEMPLATE]
                .map(str::to_string),
        );
        match source {
            DownloadSource::Url(url) => {
                args.push("--".to_string());
                args.push(url.clone());
            }
            DownloadSource::InfoJson(path) => {
                args.push("--load-info-json".to_string());
                args.push(path.display().to_string());
            }
        }
        args
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, source: std::io::Error) -> EngineError {
        EngineError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

#[async_trait]
impl Engine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    #[instrument(skip(self, options), fields(program = %self.program.display()))]
    async fn resolve(&self, url: &str, options: &EngineOptions) -> Result<Metadata, EngineError> {
        let args = self.resolve_args(url, options);
        debug!(?args, "Resolving metadata");

        let output = self
            .command(&args)
            .output()
            .await
            .map_err(|source| self.spawn_error(source))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = last_error_message(stderr.lines())
                .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status));
            return Err(EngineError::failed(message));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }

    #[instrument(skip(self, options, progress), fields(program = %self.program.display()))]
    async fn download(
        &self,
        source: &DownloadSource,
        options: &EngineOptions,
        progress: &mut dyn ProgressSink,
    ) -> Result<i32, EngineError> {
        let args = self.download_args(source, options);
        debug!(?args, "Starting download");

        let mut child = self
            .command(&args)
            .spawn()
            .map_err(|source| self.spawn_error(source))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("failed to capture yt-dlp stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("failed to capture yt-dlp stderr"))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_line_reader(stdout, Stream::Stdout, tx.clone());
        spawn_line_reader(stderr, Stream::Stderr, tx);

        let mut errors = Vec::new();
        while let Some((stream, line)) = rx.recv().await {
            if let Some(event) = parse_progress_line(&line) {
                progress.on_progress(event);
            } else if let Some(message) = error_message(&line) {
                errors.push(message.to_string());
                progress.on_progress(ProgressEvent::new("error", None));
            } else {
                trace!(?stream, line = %line, "yt-dlp output");
            }
        }

        let status = child.wait().await?;
        if status.success() {
            return Ok(0);
        }
        match errors.pop() {
            Some(message) => Err(EngineError::failed(message)),
            None => Ok(status.code().unwrap_or(-1)),
        }
    }
}

fn spawn_line_reader<R>(reader: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    debug!(?stream, error = %err, "yt-dlp output reader stopped");
                    break;
                }
            }
        }
    });
}

/// Parses one line printed through [`PROGRESS_TEMPLATE`].
///
/// Returns `None` for any other output. A percent of `NA` is reported as
/// unknown.
#[must_use]
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim_start().strip_prefix(PROGRESS_MARKER)?;
    let (status, percent) = rest.split_once('|')?;
    let status = status.trim();
    if status.is_empty() {
        return None;
    }
    let percent = Some(percent).filter(|p| !p.trim().is_empty() && p.trim() != "NA");
    Some(ProgressEvent::new(status, percent))
}

fn error_message(line: &str) -> Option<&str> {
    line.strip_prefix(ERROR_PREFIX).map(str::trim)
}

fn last_error_message<'a>(lines: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut last_error = None;
    let mut last_line = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(message) = error_message(line) {
            last_error = Some(message.to_string());
        }
        last_line = Some(line.to_string());
    }
    last_error.or(last_line)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_line_downloading() {
        let event = parse_progress_line("[mediaq] downloading| 42.5%").unwrap();
        assert_eq!(event, ProgressEvent::new("downloading", Some(" 42.5%")));
    }

    #[test]
    fn test_parse_progress_line_finished_without_percent() {
        let event = parse_progress_line("[mediaq] finished|NA").unwrap();
        assert_eq!(event, ProgressEvent::new("finished", None));
    }

    #[test]
    fn test_parse_progress_line_ignores_other_output() {
        assert!(parse_progress_line("[download] Destination: Song.webm").is_none());
        assert!(parse_progress_line("[mediaq] no separator").is_none());
        assert!(parse_progress_line("[mediaq] |10%").is_none());
    }

    #[test]
    fn test_last_error_message_prefers_error_lines() {
        let stderr = "WARNING: something\nERROR: [youtube] abc: Video unavailable\n\n";
        assert_eq!(
            last_error_message(stderr.lines()).as_deref(),
            Some("[youtube] abc: Video unavailable")
        );
    }

    #[test]
    fn test_last_error_message_falls_back_to_last_line() {
        let stderr = "Traceback (most recent call last):\nKeyError: 'x'\n";
        assert_eq!(last_error_message(stderr.lines()).as_deref(), Some("KeyError: 'x'"));
        assert!(last_error_message("".lines()).is_none());
    }

    #[test]
    fn test_resolve_args_adds_no_simulate_for_thumbnail_only_runs() {
        let engine = YtDlpEngine::new();
        let mut options = EngineOptions::hardened();
        options.skip_download = true;
        options.write_thumbnail = true;

        let args = engine.resolve_args("https://example.com/v", &options);
        assert!(args.contains(&"--dump-single-json".to_string()));
        assert!(args.contains(&"--no-simulate".to_string()));
        assert_eq!(&args[args.len() - 2..], ["--", "https://example.com/v"]);
    }

    #[test]
    fn test_resolve_args_without_thumbnail_keeps_simulation() {
        let args = YtDlpEngine::new().resolve_args("u", &EngineOptions::hardened());
        assert!(!args.contains(&"--no-simulate".to_string()));
    }

    #[test]
    fn test_download_args_from_info_json_lifts_no_progress() {
        let engine = YtDlpEngine::from_command_line("python3 -m yt_dlp").unwrap();
        let mut options = EngineOptions::hardened();
        options.no_progress = true;
        options.info_json = Some(PathBuf::from("/stale.json"));

        let args = engine.download_args(
            &DownloadSource::InfoJson(PathBuf::from("/dl/Song/Song.json")),
            &options,
        );
        assert_eq!(engine.program(), Path::new("python3"));
        assert_eq!(&args[..2], ["-m", "yt_dlp"]);
        assert!(!args.contains(&"--no-progress".to_string()));
        assert!(!args.contains(&"/stale.json".to_string()));
        assert!(args.contains(&PROGRESS_TEMPLATE.to_string()));
        assert_eq!(
            &args[args.len() - 2..],
            ["--load-info-json", "/dl/Song/Song.json"]
        );
    }

    #[test]
    fn test_from_command_line_blank_is_none() {
        assert!(YtDlpEngine::from_command_line("   ").is_none());
    }
}
