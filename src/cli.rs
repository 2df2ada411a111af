//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Queue media URLs, fetch their metadata, then download them with yt-dlp.
///
/// Each URL becomes a queue item: its metadata is resolved first (into
/// `<download-folder>/<title>/`), then the payload is downloaded with the
/// chosen format. Audio extraction to WAV is the default.
#[derive(Parser, Debug)]
#[command(name = "mediaq")]
#[command(author, version, about)]
pub struct Args {
    /// Media URLs to queue
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// Folder downloads are placed in (falls back to ~/Downloads)
    #[arg(short = 'd', long = "download-folder", value_name = "DIR")]
    pub download_folder: Option<PathBuf>,

    /// Extra yt-dlp options, split on whitespace (repeatable)
    #[arg(
        short = 'a',
        long = "additional-options",
        value_name = "OPTS",
        allow_hyphen_values = true
    )]
    pub additional_options: Vec<String>,

    /// Download video instead of extracting audio
    #[arg(long)]
    pub video: bool,

    /// Audio format to extract (e.g. wav, m4a, mp3)
    #[arg(long, value_name = "FORMAT")]
    pub audio_format: Option<String>,

    /// Preferred video resolution as offered by the source (e.g. 1920x1080)
    #[arg(long, value_name = "RES", requires = "video")]
    pub resolution: Option<String>,

    /// Preferred video container (e.g. mp4, webm)
    #[arg(long, value_name = "EXT", requires = "video")]
    pub video_format: Option<String>,

    /// Stop after metadata has been fetched
    #[arg(long)]
    pub metadata_only: bool,

    /// yt-dlp command line to run (e.g. "python3 -m yt_dlp")
    #[arg(long = "yt-dlp", value_name = "COMMAND", default_value = "yt-dlp")]
    pub yt_dlp: String,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Args {
    /// All `-a` values, split on whitespace, in order. `None` when no
    /// extra options were given.
    #[must_use]
    pub fn extra_engine_args(&self) -> Option<Vec<String>> {
        let args: Vec<String> = self
            .additional_options
            .iter()
            .flat_map(|value| value.split_whitespace())
            .map(str::to_string)
            .collect();
        (!args.is_empty()).then_some(args)
    }
}
