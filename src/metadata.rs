//! Resolved media metadata and the format choices derived from it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// The engine's spelling of "no such stream".
const ABSENT: &str = "none";

/// One downloadable format as reported by the engine.
///
/// Serializes back to the engine's own shape: absent fields stay absent and
/// numbers keep their integer or float spelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_ext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_ext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<Number>,
    /// Remaining engine fields, kept so the sidecar round-trips intact.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FormatDescriptor {
    /// Video extension, unless the engine reports none.
    #[must_use]
    pub fn video_ext(&self) -> Option<&str> {
        present(self.video_ext.as_deref())
    }

    /// Audio extension, unless the engine reports none.
    #[must_use]
    pub fn audio_ext(&self) -> Option<&str> {
        present(self.audio_ext.as_deref())
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty() && *v != ABSENT)
}

/// Structured metadata for one URL.
///
/// Produced once by the metadata task and never modified afterwards. Every
/// engine field is retained (`extra`), because the serialized record later
/// drives the download without re-resolving the URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub original_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub formats: Vec<FormatDescriptor>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metadata {
    /// Builds a minimal record; mostly useful for engines and tests.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        original_url: impl Into<String>,
        formats: Vec<FormatDescriptor>,
    ) -> Self {
        Self {
            title: title.into(),
            original_url: original_url.into(),
            formats,
            extra: Map::new(),
        }
    }

    /// Derived selector values.
    #[must_use]
    pub fn choices(&self) -> FormatChoices {
        FormatChoices::from_formats(&self.formats)
    }
}

/// Distinct selector values derived from a format list, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormatChoices {
    /// Resolutions of formats that carry video and a known width.
    pub resolutions: Vec<String>,
    /// Extensions of formats that carry video.
    pub video_exts: Vec<String>,
    /// Extensions of formats that carry audio.
    pub audio_exts: Vec<String>,
}

impl FormatChoices {
    #[must_use]
    pub fn from_formats(formats: &[FormatDescriptor]) -> Self {
        let mut choices = Self::default();
        for format in formats {
            if let Some(ext) = format.video_ext() {
                if format.width.is_some()
                    && let Some(resolution) = format.resolution.as_deref()
                {
                    push_unique(&mut choices.resolutions, resolution);
                }
                push_unique(&mut choices.video_exts, ext);
            }
            if let Some(ext) = format.audio_ext() {
                push_unique(&mut choices.audio_exts, ext);
            }
        }
        choices
    }
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}
