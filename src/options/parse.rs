//! Interprets raw engine flags into [`EngineOptions`].
//!
//! Only the flags the orchestration layer cares about are recognized. Every
//! other token is kept in `passthrough` so the engine still sees it, in the
//! order the user gave it.

use std::path::PathBuf;

use super::{EngineOptions, OptionsError, PostProcessWhen, PostProcessor};

/// Flags that take a value.
const VALUE_FLAGS: [&str; 10] = [
    "--audio-format",
    "--audio-quality",
    "--format-sort",
    "--retries",
    "--fragment-retries",
    "--concat-playlist",
    "--convert-thumbnails",
    "--paths",
    "--load-info-json",
    "-S",
];

/// Pending audio/thumbnail settings; turned into post-processors once all
/// flags have been seen, since `--audio-format` may precede `-x`.
#[derive(Debug, Default)]
struct PostProcessFlags {
    extract_audio: bool,
    audio_format: Option<String>,
    audio_quality: Option<String>,
    convert_thumbnails: Option<String>,
    embed_thumbnail: bool,
    embed_metadata: bool,
}

impl PostProcessFlags {
    fn into_postprocessors(self) -> Vec<PostProcessor> {
        let mut steps = Vec::new();
        if self.extract_audio {
            steps.push(PostProcessor::ExtractAudio {
                codec: self.audio_format.unwrap_or_else(|| "best".to_string()),
                quality: self.audio_quality.unwrap_or_else(|| "5".to_string()),
            });
        }
        if let Some(format) = self.convert_thumbnails {
            steps.push(PostProcessor::ConvertThumbnails {
                format,
                when: PostProcessWhen::BeforeDownload,
            });
        }
        if self.embed_metadata {
            steps.push(PostProcessor::EmbedMetadata);
        }
        if self.embed_thumbnail {
            steps.push(PostProcessor::EmbedThumbnail);
        }
        steps
    }
}

/// Parses `args` on top of `baseline`.
///
/// Both `--flag=value` and `--flag value` forms are accepted. Post-processors
/// implied by the flags are appended after the baseline's own steps.
///
/// # Errors
///
/// Returns [`OptionsError::MissingValue`] when a value flag ends the list, and
/// [`OptionsError::InvalidValue`] for non-numeric retry counts or unknown
/// concat policies.
pub fn parse_engine_args(
    args: &[String],
    baseline: &EngineOptions,
) -> Result<EngineOptions, OptionsError> {
    let mut options = baseline.clone();
    let mut pp = PostProcessFlags::default();
    let mut tokens = args.iter().map(String::as_str).peekable();

    while let Some(token) = tokens.next() {
        let (flag, inline) = split_inline_value(token);

        let value = if VALUE_FLAGS.contains(&flag) {
            match inline {
                Some(value) => Some(value.to_string()),
                None => Some(
                    tokens
                        .next()
                        .ok_or_else(|| OptionsError::missing(flag))?
                        .to_string(),
                ),
            }
        } else {
            None
        };

        match (flag, value) {
            ("-x" | "--extract-audio", None) => pp.extract_audio = true,
            ("--audio-format", Some(value)) => pp.audio_format = Some(value),
            ("--audio-quality", Some(value)) => pp.audio_quality = Some(value),
            ("-S" | "--format-sort", Some(value)) => options.format_sort = Some(value),
            ("--retries", Some(value)) => options.retries = parse_count(flag, &value)?,
            ("--fragment-retries", Some(value)) => {
                options.fragment_retries = parse_count(flag, &value)?;
            }
            ("--concat-playlist", Some(value)) => {
                options.concat_playlist = value
                    .parse()
                    .map_err(|_| OptionsError::invalid(flag, &value))?;
            }
            ("--convert-thumbnails", Some(value)) => pp.convert_thumbnails = Some(value),
            ("--paths", Some(value)) => options.paths_home = Some(PathBuf::from(value)),
            ("--load-info-json", Some(value)) => options.info_json = Some(PathBuf::from(value)),
            ("-i" | "--ignore-errors", None) => options.ignore_errors = true,
            ("--abort-on-error" | "--no-ignore-errors", None) => options.ignore_errors = false,
            ("--flat-playlist", None) => options.extract_flat = true,
            ("--no-flat-playlist", None) => options.extract_flat = false,
            ("--no-playlist", None) => options.no_playlist = true,
            ("--yes-playlist", None) => options.no_playlist = false,
            ("-q" | "--quiet", None) => options.quiet = true,
            ("--no-quiet", None) => options.quiet = false,
            ("--no-progress", None) => options.no_progress = true,
            ("--skip-download" | "--no-download", None) => options.skip_download = true,
            ("--write-thumbnail", None) => options.write_thumbnail = true,
            ("--no-write-thumbnail", None) => options.write_thumbnail = false,
            ("--embed-thumbnail", None) => pp.embed_thumbnail = true,
            ("--embed-metadata" | "--add-metadata", None) => pp.embed_metadata = true,
            _ => {
                options.passthrough.push(token.to_string());
                // An unknown flag's separate value travels with it.
                if token.starts_with('-')
                    && inline.is_none()
                    && let Some(next) = tokens.peek()
                    && !next.starts_with('-')
                {
                    options.passthrough.push((*next).to_string());
                    tokens.next();
                }
            }
        }
    }

    options.postprocessors.extend(pp.into_postprocessors());
    Ok(options)
}

/// Splits `--flag=value` and maps short aliases to their long spelling.
fn split_inline_value(token: &str) -> (&str, Option<&str>) {
    let (flag, value) = match token.split_once('=') {
        Some((flag, value)) if flag.starts_with("--") => (flag, Some(value)),
        _ => (token, None),
    };
    match flag {
        "-R" => ("--retries", value),
        "-P" => ("--paths", value),
        other => (other, value),
    }
}

fn parse_count(flag: &str, value: &str) -> Result<u32, OptionsError> {
    if value == "infinite" || value == "inf" {
        return Ok(u32::MAX);
    }
    value
        .parse()
        .map_err(|_| OptionsError::invalid(flag, value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::options::ConcatPolicy;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn test_parse_empty_returns_baseline() {
        let baseline = EngineOptions::hardened();
        let parsed = parse_engine_args(&[], &baseline).unwrap();
        assert_eq!(parsed, baseline);
    }

    #[test]
    fn test_parse_extract_audio_with_inline_values() {
        let parsed = parse_engine_args(
            &args(&["--extract-audio", "--audio-quality=0", "--audio-format=wav"]),
            &EngineOptions::hardened(),
        )
        .unwrap();
        assert_eq!(
            parsed.postprocessors,
            vec![PostProcessor::ExtractAudio {
                codec: "wav".to_string(),
                quality: "0".to_string(),
            }]
        );
    }

    #[test]
    fn test_parse_audio_format_before_extract_flag() {
        let parsed = parse_engine_args(
            &args(&["--audio-format", "mp3", "-x"]),
            &EngineOptions::hardened(),
        )
        .unwrap();
        assert_eq!(
            parsed.postprocessors,
            vec![PostProcessor::ExtractAudio {
                codec: "mp3".to_string(),
                quality: "5".to_string(),
            }]
        );
    }

    #[test]
    fn test_parse_audio_format_without_extract_adds_nothing() {
        let parsed =
            parse_engine_args(&args(&["--audio-format=wav"]), &EngineOptions::hardened())
                .unwrap();
        assert!(parsed.postprocessors.is_empty());
    }

    #[test]
    fn test_parse_short_and_separate_value_forms() {
        let parsed = parse_engine_args(
            &args(&["-S", "res:1080,ext:mp4", "-R", "3", "-P", "/media"]),
            &EngineOptions::default(),
        )
        .unwrap();
        assert_eq!(parsed.format_sort.as_deref(), Some("res:1080,ext:mp4"));
        assert_eq!(parsed.retries, 3);
        assert_eq!(parsed.paths_home, Some(PathBuf::from("/media")));
    }

    #[test]
    fn test_parse_unknown_flags_pass_through_with_values() {
        let parsed = parse_engine_args(
            &args(&["--cookies-from-browser", "firefox", "--no-mtime", "--limit-rate=2M"]),
            &EngineOptions::hardened(),
        )
        .unwrap();
        assert_eq!(
            parsed.passthrough,
            args(&["--cookies-from-browser", "firefox", "--no-mtime", "--limit-rate=2M"])
        );
    }

    #[test]
    fn test_parse_missing_value_is_error() {
        let err = parse_engine_args(&args(&["--audio-format"]), &EngineOptions::hardened())
            .unwrap_err();
        assert_eq!(
            err,
            OptionsError::MissingValue {
                flag: "--audio-format".to_string()
            }
        );
    }

    #[test]
    fn test_parse_invalid_retries_is_error() {
        let err = parse_engine_args(&args(&["--retries=many"]), &EngineOptions::hardened())
            .unwrap_err();
        assert!(matches!(err, OptionsError::InvalidValue { .. }));
    }

    #[test]
    fn test_parse_infinite_retries() {
        let parsed =
            parse_engine_args(&args(&["--retries", "infinite"]), &EngineOptions::hardened())
                .unwrap();
        assert_eq!(parsed.retries, u32::MAX);
    }

    #[test]
    fn test_parse_concat_policy() {
        let parsed = parse_engine_args(
            &args(&["--concat-playlist", "always"]),
            &EngineOptions::hardened(),
        )
        .unwrap();
        assert_eq!(parsed.concat_playlist, ConcatPolicy::Always);
    }

    #[test]
    fn test_parse_appends_after_baseline_postprocessors() {
        let mut baseline = EngineOptions::hardened();
        baseline.postprocessors.push(PostProcessor::EmbedMetadata);
        let parsed =
            parse_engine_args(&args(&["--embed-thumbnail"]), &baseline).unwrap();
        assert_eq!(
            parsed.postprocessors,
            vec![PostProcessor::EmbedMetadata, PostProcessor::EmbedThumbnail]
        );
    }
}
