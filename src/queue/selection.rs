//! Per-item format selection.

use super::UsageError;
use crate::metadata::FormatChoices;

/// Selector value meaning "let the engine decide".
pub const BEST: &str = "best";

/// Audio format offered before any engine-reported one.
pub const DEFAULT_AUDIO_FORMAT: &str = "wav";

/// One drop-down: offered values and the current choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    name: &'static str,
    offered: Vec<String>,
    selected: usize,
}

impl Selector {
    fn new(name: &'static str, first: &str) -> Self {
        Self {
            name,
            offered: vec![first.to_string()],
            selected: 0,
        }
    }

    fn extend<'a>(&mut self, values: impl IntoIterator<Item = &'a String>) {
        for value in values {
            if !self.offered.contains(value) {
                self.offered.push(value.clone());
            }
        }
    }

    fn select(&mut self, value: &str) -> Result<(), UsageError> {
        let index = self
            .offered
            .iter()
            .position(|v| v == value)
            .ok_or_else(|| UsageError::unknown_choice(self.name, value))?;
        self.selected = index;
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn offered(&self) -> &[String] {
        &self.offered
    }

    #[must_use]
    pub fn selected(&self) -> &str {
        // `selected` always indexes `offered`, which is never empty.
        self.offered.get(self.selected).map_or(BEST, String::as_str)
    }
}

/// Format choices of one queue item.
///
/// Audio-only mode enables the audio-format selector; otherwise the
/// resolution and video-extension selectors are used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSelection {
    audio_only: bool,
    audio_format: Selector,
    resolution: Selector,
    video_ext: Selector,
}

impl Default for FormatSelection {
    fn default() -> Self {
        Self {
            audio_only: true,
            audio_format: Selector::new("audio format", DEFAULT_AUDIO_FORMAT),
            resolution: Selector::new("resolution", BEST),
            video_ext: Selector::new("video format", BEST),
        }
    }
}

impl FormatSelection {
    /// Adds the values derived from resolved metadata.
    pub fn extend_from(&mut self, choices: &FormatChoices) {
        self.audio_format.extend(&choices.audio_exts);
        self.resolution.extend(&choices.resolutions);
        self.video_ext.extend(&choices.video_exts);
    }

    #[must_use]
    pub fn audio_only(&self) -> bool {
        self.audio_only
    }

    pub fn set_audio_only(&mut self, enabled: bool) {
        self.audio_only = enabled;
    }

    #[must_use]
    pub fn audio_format(&self) -> &Selector {
        &self.audio_format
    }

    #[must_use]
    pub fn resolution(&self) -> &Selector {
        &self.resolution
    }

    #[must_use]
    pub fn video_ext(&self) -> &Selector {
        &self.video_ext
    }

    /// Selectors that are active in the current mode.
    #[must_use]
    pub fn enabled_selectors(&self) -> Vec<&Selector> {
        if self.audio_only {
            vec![&self.audio_format]
        } else {
            vec![&self.resolution, &self.video_ext]
        }
    }

    /// # Errors
    ///
    /// Returns [`UsageError::UnknownChoice`] when `value` is not offered.
    pub fn select_audio_format(&mut self, value: &str) -> Result<(), UsageError> {
        self.audio_format.select(value)
    }

    /// # Errors
    ///
    /// Returns [`UsageError::UnknownChoice`] when `value` is not offered.
    pub fn select_resolution(&mut self, value: &str) -> Result<(), UsageError> {
        self.resolution.select(value)
    }

    /// # Errors
    ///
    /// Returns [`UsageError::UnknownChoice`] when `value` is not offered.
    pub fn select_video_ext(&mut self, value: &str) -> Result<(), UsageError> {
        self.video_ext.select(value)
    }

    /// Engine flags for the current choices.
    #[must_use]
    pub fn engine_args(&self) -> Vec<String> {
        if self.audio_only {
            return vec![
                "--extract-audio".to_string(),
                "--audio-quality=0".to_string(),
                format!("--audio-format={}", self.audio_format.selected()),
            ];
        }
        format_preference(self.resolution.selected(), self.video_ext.selected())
            .map(|pref| vec![format!("--format-sort={pref}")])
            .unwrap_or_default()
    }
}

/// Builds a `--format-sort` value from a resolution and a video extension.
///
/// `1920x1080` + `mp4` gives `res:1080,ext:mp4`; `best` parts are left out
/// and two `best`s give `None`.
#[must_use]
pub fn format_preference(resolution: &str, video_ext: &str) -> Option<String> {
    let mut parts = Vec::new();
    if resolution != BEST {
        let height = resolution.rsplit('x').next().unwrap_or(resolution);
        parts.push(format!("res:{height}"));
    }
    if video_ext != BEST {
        parts.push(format!("ext:{video_ext}"));
    }
    (!parts.is_empty()).then(|| parts.join(","))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn choices() -> FormatChoices {
        FormatChoices {
            resolutions: vec!["1920x1080".to_string(), "1280x720".to_string()],
            video_exts: vec!["mp4".to_string(), "webm".to_string()],
            audio_exts: vec!["m4a".to_string(), "wav".to_string()],
        }
    }

    #[test]
    fn test_format_preference() {
        assert_eq!(format_preference("1920x1080", "mp4").as_deref(), Some("res:1080,ext:mp4"));
        assert_eq!(format_preference("1280x720", "best").as_deref(), Some("res:720"));
        assert_eq!(format_preference("best", "webm").as_deref(), Some("ext:webm"));
        assert_eq!(format_preference("best", "best"), None);
    }

    #[test]
    fn test_defaults_offer_best_and_wav_first() {
        let mut selection = FormatSelection::default();
        selection.extend_from(&choices());
        assert!(selection.audio_only());
        assert_eq!(selection.audio_format().offered(), ["wav", "m4a"]);
        assert_eq!(selection.resolution().offered(), ["best", "1920x1080", "1280x720"]);
        assert_eq!(selection.video_ext().offered(), ["best", "mp4", "webm"]);
        assert_eq!(selection.audio_format().selected(), "wav");
    }

    #[test]
    fn test_audio_only_args() {
        let selection = FormatSelection::default();
        assert_eq!(
            selection.engine_args(),
            vec!["--extract-audio", "--audio-quality=0", "--audio-format=wav"]
        );
        assert_eq!(selection.enabled_selectors().len(), 1);
    }

    #[test]
    fn test_video_args_follow_selection() {
        let mut selection = FormatSelection::default();
        selection.extend_from(&choices());
        selection.set_audio_only(false);
        assert!(selection.engine_args().is_empty());

        selection.select_resolution("1280x720").unwrap();
        selection.select_video_ext("webm").unwrap();
        assert_eq!(selection.engine_args(), vec!["--format-sort=res:720,ext:webm"]);
        assert_eq!(selection.enabled_selectors().len(), 2);
    }

    #[test]
    fn test_select_unknown_value_is_rejected() {
        let mut selection = FormatSelection::default();
        let err = selection.select_audio_format("flac").unwrap_err();
        assert_eq!(err, UsageError::unknown_choice("audio format", "flac"));
        assert_eq!(selection.audio_format().selected(), "wav");
    }
}
