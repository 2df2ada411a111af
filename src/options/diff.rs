//! Structural delta between two [`EngineOptions`].

use std::path::PathBuf;

use super::{ConcatPolicy, EngineOptions, PostProcessor};

/// Fields of an [`EngineOptions`] that differ from a baseline.
///
/// `None` means "same as baseline".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OptionsDelta {
    pub ignore_errors: Option<bool>,
    pub retries: Option<u32>,
    pub fragment_retries: Option<u32>,
    pub extract_flat: Option<bool>,
    pub concat_playlist: Option<ConcatPolicy>,
    pub no_playlist: Option<bool>,
    pub quiet: Option<bool>,
    pub no_progress: Option<bool>,
    pub skip_download: Option<bool>,
    pub write_thumbnail: Option<bool>,
    pub paths_home: Option<Option<PathBuf>>,
    pub thumbnail_template: Option<Option<String>>,
    pub postprocessors: Option<Vec<PostProcessor>>,
    pub format_sort: Option<Option<String>>,
    pub info_json: Option<Option<PathBuf>>,
    pub passthrough: Option<Vec<String>>,
}

fn changed<T: PartialEq + Clone>(baseline: &T, value: &T) -> Option<T> {
    (baseline != value).then(|| value.clone())
}

fn pick<T: Clone>(delta: Option<&T>, base: &T) -> T {
    delta.unwrap_or(base).clone()
}

/// Returns the fields of `overrides` that differ from `baseline`.
///
/// Post-processors get special treatment: when the lists differ, the delta
/// holds the override steps minus any step the baseline already registers,
/// so engine-default steps are never registered twice.
#[must_use]
pub fn diff(baseline: &EngineOptions, overrides: &EngineOptions) -> OptionsDelta {
    let postprocessors = (baseline.postprocessors != overrides.postprocessors).then(|| {
        overrides
            .postprocessors
            .iter()
            .filter(|pp| !baseline.postprocessors.contains(pp))
            .cloned()
            .collect()
    });

    OptionsDelta {
        ignore_errors: changed(&baseline.ignore_errors, &overrides.ignore_errors),
        retries: changed(&baseline.retries, &overrides.retries),
        fragment_retries: changed(&baseline.fragment_retries, &overrides.fragment_retries),
        extract_flat: changed(&baseline.extract_flat, &overrides.extract_flat),
        concat_playlist: changed(&baseline.concat_playlist, &overrides.concat_playlist),
        no_playlist: changed(&baseline.no_playlist, &overrides.no_playlist),
        quiet: changed(&baseline.quiet, &overrides.quiet),
        no_progress: changed(&baseline.no_progress, &overrides.no_progress),
        skip_download: changed(&baseline.skip_download, &overrides.skip_download),
        write_thumbnail: changed(&baseline.write_thumbnail, &overrides.write_thumbnail),
        paths_home: changed(&baseline.paths_home, &overrides.paths_home),
        thumbnail_template: changed(&baseline.thumbnail_template, &overrides.thumbnail_template),
        postprocessors,
        format_sort: changed(&baseline.format_sort, &overrides.format_sort),
        info_json: changed(&baseline.info_json, &overrides.info_json),
        passthrough: changed(&baseline.passthrough, &overrides.passthrough),
    }
}

impl OptionsDelta {
    /// True when no field differs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merges this delta over `base`.
    #[must_use]
    pub fn apply(&self, base: &EngineOptions) -> EngineOptions {
        EngineOptions {
            ignore_errors: pick(self.ignore_errors.as_ref(), &base.ignore_errors),
            retries: pick(self.retries.as_ref(), &base.retries),
            fragment_retries: pick(self.fragment_retries.as_ref(), &base.fragment_retries),
            extract_flat: pick(self.extract_flat.as_ref(), &base.extract_flat),
            concat_playlist: pick(self.concat_playlist.as_ref(), &base.concat_playlist),
            no_playlist: pick(self.no_playlist.as_ref(), &base.no_playlist),
            quiet: pick(self.quiet.as_ref(), &base.quiet),
            no_progress: pick(self.no_progress.as_ref(), &base.no_progress),
            skip_download: pick(self.skip_download.as_ref(), &base.skip_download),
            write_thumbnail: pick(self.write_thumbnail.as_ref(), &base.write_thumbnail),
            paths_home: pick(self.paths_home.as_ref(), &base.paths_home),
            thumbnail_template: pick(self.thumbnail_template.as_ref(), &base.thumbnail_template),
            postprocessors: pick(self.postprocessors.as_ref(), &base.postprocessors),
            format_sort: pick(self.format_sort.as_ref(), &base.format_sort),
            info_json: pick(self.info_json.as_ref(), &base.info_json),
            passthrough: pick(self.passthrough.as_ref(), &base.passthrough),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::PostProcessWhen;

    fn png_convert() -> PostProcessor {
        PostProcessor::ConvertThumbnails {
            format: "png".to_string(),
            when: PostProcessWhen::BeforeDownload,
        }
    }

    fn extract_wav() -> PostProcessor {
        PostProcessor::ExtractAudio {
            codec: "wav".to_string(),
            quality: "0".to_string(),
        }
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let options = EngineOptions::hardened();
        assert!(diff(&options, &options).is_empty());

        let mut custom = EngineOptions::default();
        custom.format_sort = Some("res:720".to_string());
        custom.postprocessors.push(extract_wav());
        assert!(diff(&custom, &custom).is_empty());
    }

    #[test]
    fn test_diff_reports_only_changed_fields() {
        let baseline = EngineOptions::hardened();
        let mut overrides = baseline.clone();
        overrides.quiet = true;
        overrides.format_sort = Some("ext:mp4".to_string());

        let delta = diff(&baseline, &overrides);
        assert_eq!(
            delta,
            OptionsDelta {
                quiet: Some(true),
                format_sort: Some(Some("ext:mp4".to_string())),
                ..OptionsDelta::default()
            }
        );
    }

    #[test]
    fn test_diff_filters_baseline_postprocessors() {
        let mut baseline = EngineOptions::hardened();
        baseline.postprocessors = vec![png_convert()];
        let mut overrides = baseline.clone();
        overrides.postprocessors = vec![png_convert(), extract_wav()];

        let delta = diff(&baseline, &overrides);
        assert_eq!(delta.postprocessors, Some(vec![extract_wav()]));
    }

    #[test]
    fn test_diff_postprocessors_unchanged_is_absent() {
        let mut baseline = EngineOptions::hardened();
        baseline.postprocessors = vec![png_convert()];
        let delta = diff(&baseline, &baseline.clone());
        assert!(delta.postprocessors.is_none());
    }

    #[test]
    fn test_apply_empty_delta_returns_base() {
        let base = EngineOptions::hardened();
        assert_eq!(OptionsDelta::default().apply(&base), base);
    }

    #[test]
    fn test_diff_is_idempotent_when_reapplied() {
        let mut baseline = EngineOptions::hardened();
        baseline.postprocessors = vec![png_convert()];
        let mut overrides = EngineOptions::default();
        overrides.postprocessors = vec![png_convert(), extract_wav()];
        overrides.passthrough = vec!["--no-mtime".to_string()];
        overrides.paths_home = Some(PathBuf::from("/downloads"));

        let first = diff(&baseline, &overrides);
        let merged = first.apply(&baseline);
        let second = diff(&baseline, &merged);
        assert_eq!(first, second);
    }

    #[test]
    fn test_diff_clearing_optional_field_is_recorded() {
        let mut baseline = EngineOptions::hardened();
        baseline.format_sort = Some("res:480".to_string());
        let overrides = EngineOptions::hardened();

        let delta = diff(&baseline, &overrides);
        assert_eq!(delta.format_sort, Some(None));
        assert_eq!(delta.apply(&baseline).format_sort, None);
    }
}
