//! Typed engine option bag.
//!
//! The engine accepts a fixed, enumerated set of recognized options plus an
//! ordered list of opaque pass-through flags. User-supplied raw flags are
//! parsed into this structure ([`parse_engine_args`]), compared against a
//! hardened baseline ([`diff`]) and rendered back to engine argv
//! ([`EngineOptions::to_args`]).
//!
//! # Example
//!
//! ```
//! use mediaq_core::options::merge_user_args;
//!
//! let args = vec!["--extract-audio".to_string(), "--audio-format=wav".to_string()];
//! let options = merge_user_args(Some(args.as_slice())).unwrap();
//! assert_eq!(options.retries, 0);
//! assert!(!options.postprocessors.is_empty());
//! ```

mod diff;
mod error;
mod parse;

pub use diff::{OptionsDelta, diff};
pub use error::OptionsError;
pub use parse::parse_engine_args;

use std::fmt;
use std::path::PathBuf;

/// Engine default for network retries.
pub const ENGINE_DEFAULT_RETRIES: u32 = 10;

/// Playlist concatenation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcatPolicy {
    /// Never concatenate playlist entries.
    Never,
    /// Always concatenate playlist entries.
    Always,
    /// Concatenate only multi-video playlists (engine default).
    #[default]
    MultiVideo,
}

impl ConcatPolicy {
    /// Returns the engine spelling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Always => "always",
            Self::MultiVideo => "multi_video",
        }
    }
}

impl fmt::Display for ConcatPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConcatPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(Self::Never),
            "always" => Ok(Self::Always),
            "multi_video" => Ok(Self::MultiVideo),
            _ => Err(format!("invalid concat policy: {s}")),
        }
    }
}

/// When a post-processing step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostProcessWhen {
    /// Before the payload download starts.
    BeforeDownload,
    /// After the payload has been downloaded.
    PostProcess,
}

/// A post-processing step registered with the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcessor {
    /// Extract the audio track and re-encode it.
    ExtractAudio {
        /// Target codec (`best`, `wav`, `mp3`, ...).
        codec: String,
        /// Quality, `0` is best.
        quality: String,
    },
    /// Convert downloaded thumbnails to another image format.
    ConvertThumbnails {
        /// Target image format.
        format: String,
        /// Phase the conversion runs in.
        when: PostProcessWhen,
    },
    /// Embed the thumbnail as cover art.
    EmbedThumbnail,
    /// Embed metadata tags into the file.
    EmbedMetadata,
}

impl PostProcessor {
    fn push_args(&self, args: &mut Vec<String>) {
        match self {
            Self::ExtractAudio { codec, quality } => {
                args.push("--extract-audio".to_string());
                args.push(format!("--audio-format={codec}"));
                args.push(format!("--audio-quality={quality}"));
            }
            Self::ConvertThumbnails { format, .. } => {
                args.push(format!("--convert-thumbnails={format}"));
            }
            Self::EmbedThumbnail => args.push("--embed-thumbnail".to_string()),
            Self::EmbedMetadata => args.push("--embed-metadata".to_string()),
        }
    }
}

/// Recognized engine options.
///
/// `Default` mirrors the engine's own defaults; [`EngineOptions::hardened`]
/// is the baseline every task starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub ignore_errors: bool,
    pub retries: u32,
    pub fragment_retries: u32,
    pub extract_flat: bool,
    pub concat_playlist: ConcatPolicy,
    pub no_playlist: bool,
    pub quiet: bool,
    pub no_progress: bool,
    pub skip_download: bool,
    pub write_thumbnail: bool,
    /// Output home folder (`--paths`).
    pub paths_home: Option<PathBuf>,
    /// Output template for thumbnails only.
    pub thumbnail_template: Option<String>,
    pub postprocessors: Vec<PostProcessor>,
    /// Format sort preference (`--format-sort`).
    pub format_sort: Option<String>,
    /// Metadata record to download from instead of the URL.
    pub info_json: Option<PathBuf>,
    /// Unrecognized flags, passed through verbatim and in order.
    pub passthrough: Vec<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            ignore_errors: false,
            retries: ENGINE_DEFAULT_RETRIES,
            fragment_retries: ENGINE_DEFAULT_RETRIES,
            extract_flat: false,
            concat_playlist: ConcatPolicy::MultiVideo,
            no_playlist: false,
            quiet: false,
            no_progress: false,
            skip_download: false,
            write_thumbnail: false,
            paths_home: None,
            thumbnail_template: None,
            postprocessors: Vec::new(),
            format_sort: None,
            info_json: None,
            passthrough: Vec::new(),
        }
    }
}

impl EngineOptions {
    /// Baseline with error-ignoring, retries, flattening and playlist
    /// concatenation all disabled, so a partial result always surfaces as a
    /// failure.
    #[must_use]
    pub fn hardened() -> Self {
        let mut options = Self::default();
        options.harden();
        options
    }

    /// Re-applies the hardened fields on top of whatever the user asked for.
    pub fn harden(&mut self) {
        self.ignore_errors = false;
        self.retries = 0;
        self.fragment_retries = 0;
        self.extract_flat = false;
        self.concat_playlist = ConcatPolicy::Never;
    }

    /// Renders the options as engine argv, in a fixed order.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        args.push(if self.ignore_errors {
            "--ignore-errors".to_string()
        } else {
            "--abort-on-error".to_string()
        });
        args.push(format!("--retries={}", self.retries));
        args.push(format!("--fragment-retries={}", self.fragment_retries));
        args.push(if self.extract_flat {
            "--flat-playlist".to_string()
        } else {
            "--no-flat-playlist".to_string()
        });
        args.push(format!("--concat-playlist={}", self.concat_playlist));

        let switches = [
            (self.no_playlist, "--no-playlist"),
            (self.quiet, "--quiet"),
            (self.no_progress, "--no-progress"),
            (self.skip_download, "--skip-download"),
            (self.write_thumbnail, "--write-thumbnail"),
        ];
        for (enabled, flag) in switches {
            if enabled {
                args.push(flag.to_string());
            }
        }

        if let Some(home) = &self.paths_home {
            args.push("--paths".to_string());
            args.push(home.display().to_string());
        }
        if let Some(template) = &self.thumbnail_template {
            args.push("--output".to_string());
            args.push(format!("thumbnail:{template}"));
        }
        for pp in &self.postprocessors {
            pp.push_args(&mut args);
        }
        if let Some(sort) = &self.format_sort {
            args.push(format!("--format-sort={sort}"));
        }
        if let Some(info) = &self.info_json {
            args.push("--load-info-json".to_string());
            args.push(info.display().to_string());
        }
        args.extend(self.passthrough.iter().cloned());
        args
    }
}

/// Parses user flags and merges their delta over the hardened baseline.
///
/// The hardened fields are re-applied after the merge; user flags cannot
/// loosen them.
///
/// # Errors
///
/// Returns [`OptionsError`] when a recognized flag is malformed.
pub fn merge_user_args(extra_args: Option<&[String]>) -> Result<EngineOptions, OptionsError> {
    let baseline = EngineOptions::hardened();
    let Some(extra_args) = extra_args else {
        return Ok(baseline);
    };
    let requested = parse_engine_args(extra_args, &baseline)?;
    let mut merged = diff(&baseline, &requested).apply(&baseline);
    merged.harden();
    Ok(merged)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hardened_baseline_values() {
        let options = EngineOptions::hardened();
        assert!(!options.ignore_errors);
        assert_eq!(options.retries, 0);
        assert_eq!(options.fragment_retries, 0);
        assert!(!options.extract_flat);
        assert_eq!(options.concat_playlist, ConcatPolicy::Never);
    }

    #[test]
    fn test_to_args_renders_hardened_flags() {
        let args = EngineOptions::hardened().to_args();
        assert_eq!(
            args,
            vec![
                "--abort-on-error",
                "--retries=0",
                "--fragment-retries=0",
                "--no-flat-playlist",
                "--concat-playlist=never",
            ]
        );
    }

    #[test]
    fn test_to_args_renders_paths_templates_and_passthrough_last() {
        let mut options = EngineOptions::hardened();
        options.paths_home = Some(PathBuf::from("/dl/tmp"));
        options.thumbnail_template = Some("id.%(ext)s".to_string());
        options.postprocessors.push(PostProcessor::ConvertThumbnails {
            format: "png".to_string(),
            when: PostProcessWhen::BeforeDownload,
        });
        options.passthrough.push("--cookies-from-browser".to_string());
        options.passthrough.push("firefox".to_string());

        let args = options.to_args();
        let joined = args.join(" ");
        assert!(joined.contains("--paths /dl/tmp"));
        assert!(joined.contains("--output thumbnail:id.%(ext)s"));
        assert!(joined.contains("--convert-thumbnails=png"));
        assert_eq!(args.last().unwrap(), "firefox");
    }

    #[test]
    fn test_merge_user_args_none_is_hardened() {
        assert_eq!(merge_user_args(None).unwrap(), EngineOptions::hardened());
    }

    #[test]
    fn test_merge_user_args_cannot_loosen_hardening() {
        let args = vec![
            "--ignore-errors".to_string(),
            "--retries".to_string(),
            "5".to_string(),
            "--concat-playlist=always".to_string(),
        ];
        let merged = merge_user_args(Some(args.as_slice())).unwrap();
        assert_eq!(merged, EngineOptions::hardened());
    }

    #[test]
    fn test_merge_user_args_keeps_format_sort_and_passthrough() {
        let args = vec![
            "-S".to_string(),
            "res:720".to_string(),
            "--limit-rate".to_string(),
            "1M".to_string(),
        ];
        let merged = merge_user_args(Some(args.as_slice())).unwrap();
        assert_eq!(merged.format_sort.as_deref(), Some("res:720"));
        assert_eq!(merged.passthrough, vec!["--limit-rate", "1M"]);
    }

    #[test]
    fn test_concat_policy_from_str() {
        assert_eq!("never".parse::<ConcatPolicy>().unwrap(), ConcatPolicy::Never);
        assert!("sometimes".parse::<ConcatPolicy>().is_err());
    }
}
