use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use mediaq_core::config;
use mediaq_core::{Config, ItemState, Queue, QueueItem, YtDlpEngine};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::input;
use crate::app::progress_manager::ProgressBoard;
use crate::app::terminal;
use crate::cli::Args;

/// Ctrl-C state shared with the signal task.
struct Interrupt {
    flag: AtomicBool,
    notify: Notify,
}

impl Interrupt {
    fn spawn_listener() -> Arc<Self> {
        let interrupt = Arc::new(Self {
            flag: AtomicBool::new(false),
            notify: Notify::new(),
        });
        let signal = Arc::clone(&interrupt);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                signal.flag.store(true, Ordering::SeqCst);
                signal.notify.notify_one();
            }
        });
        interrupt
    }

    fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub(crate) async fn run_mediaq(args: Args) -> Result<ProcessExit> {
    let no_color = terminal::is_no_color_requested(args.no_color);
    terminal::init_tracing(
        terminal::resolve_default_log_level(args.quiet, args.verbose),
        no_color,
    );
    debug!(?args, "CLI arguments parsed");

    let (urls, rejected) = input::partition_urls(&args.urls);
    for entry in &rejected {
        warn!(input = %entry, "Skipped input that is not a URL");
    }
    if urls.is_empty() {
        info!("No URLs to queue. Example: mediaq https://www.youtube.com/watch?v=...");
        return Ok(if rejected.is_empty() {
            ProcessExit::Success
        } else {
            ProcessExit::Failure
        });
    }

    let root = config::resolve_download_root(
        args.download_folder.as_deref(),
        config::default_download_root,
    )?;
    config::ensure_download_root(&root)
        .with_context(|| format!("cannot use download folder {}", root.display()))?;
    info!(root = %root.display(), "Download folder ready");

    let mut defaults = Config::new(&root);
    if let Some(extra) = args.extra_engine_args() {
        defaults = defaults.with_extra_engine_args(extra);
    }
    let engine = YtDlpEngine::from_command_line(&args.yt_dlp)
        .context("--yt-dlp must name a program")?;

    let mut queue = Queue::new(defaults, Arc::new(engine));
    for url in &urls {
        queue.add(url);
    }

    let interrupt = Interrupt::spawn_listener();
    let use_bars = terminal::should_use_progress_bars(
        io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
    );
    let mut board = ProgressBoard::new(use_bars);

    drive_until_idle(&mut queue, &mut board, &interrupt).await;
    if interrupt.is_set() {
        board.clear();
        warn!("Interrupted while fetching metadata");
        return Ok(ProcessExit::Failure);
    }

    for item in queue.iter_mut() {
        apply_format_choices(item, &args);
    }

    if !args.metadata_only {
        queue.download_selected(&[]);
        drive_until_idle(&mut queue, &mut board, &interrupt).await;
        if interrupt.is_set() {
            board.clear();
            warn!("Interrupted. Partial files may remain in the download folder.");
            return Ok(ProcessExit::Failure);
        }
    }

    debug!(bars = board.len(), "Run finished");
    Ok(print_summary(&queue, args.metadata_only))
}

/// The controlling loop: handles task events until the queue is idle or
/// Ctrl-C is pressed.
async fn drive_until_idle(queue: &mut Queue, board: &mut ProgressBoard, interrupt: &Interrupt) {
    for item in queue.iter() {
        board.sync(item);
    }
    while !queue.is_idle() && !interrupt.is_set() {
        tokio::select! {
            event = queue.next_event() => {
                let Some(event) = event else {
                    break;
                };
                let id = event.item();
                queue.handle_event(event);
                if let Some(item) = queue.get(id) {
                    board.sync(item);
                }
            }
            () = interrupt.notify.notified() => break,
        }
    }
}

fn apply_format_choices(item: &mut QueueItem, args: &Args) {
    if item.state() != ItemState::MetadataReady {
        return;
    }
    item.toggle_audio_only(!args.video);

    let results = [
        args.audio_format
            .as_deref()
            .map(|value| item.select_audio_format(value)),
        args.resolution
            .as_deref()
            .map(|value| item.select_resolution(value)),
        args.video_format
            .as_deref()
            .map(|value| item.select_video_ext(value)),
    ];
    for err in results.into_iter().flatten().filter_map(Result::err) {
        warn!(item = %item.id(), error = %err, "Keeping default choice");
    }
}

fn print_summary(queue: &Queue, metadata_only: bool) -> ProcessExit {
    let mut completed = 0;
    let mut failed = 0;
    for item in queue.iter() {
        let label = item.title().unwrap_or(item.url());
        match item.state() {
            ItemState::DownloadDone => {
                completed += 1;
                println!("done    {label}  {}", item.config().download_root.display());
            }
            ItemState::MetadataReady if metadata_only => {
                completed += 1;
                println!("ready   {label}  {}", item.config().download_root.display());
            }
            ItemState::MetadataFailed | ItemState::DownloadFailed => {
                failed += 1;
                println!("failed  {label}  {}", item.status_message());
            }
            state => {
                failed += 1;
                println!("{state}  {label}");
            }
        }
    }
    info!(completed, failed, total = queue.len(), "Queue finished");
    ProcessExit::from_counts(completed, failed)
}
