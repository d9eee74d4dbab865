//! Pipeline inputs and per-run options

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::StepId;

/// Reference to a media file: local path, `file://` URL or `http(s)://` URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(String);

impl MediaRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank references are treated as absent
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Caller-supplied wine details used as lowest-priority form values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WineHints {
    pub name: Option<String>,
    pub producer: Option<String>,
    pub vintage: Option<i32>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub wine_type: Option<String>,
    pub grape_varieties: Vec<String>,
}

impl WineHints {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.producer.is_none()
            && self.vintage.is_none()
            && self.region.is_none()
            && self.country.is_none()
            && self.wine_type.is_none()
            && self.grape_varieties.is_empty()
    }
}

/// Everything one pipeline run may draw on; all parts are optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AiProcessingInput {
    /// Wine label photo
    pub image: Option<MediaRef>,
    /// Spoken tasting notes
    pub audio: Option<MediaRef>,
    /// Typed tasting notes
    pub text: Option<String>,
    pub hints: Option<WineHints>,
}

impl AiProcessingInput {
    pub fn image(&self) -> Option<&MediaRef> {
        self.image.as_ref().filter(|m| !m.is_blank())
    }

    pub fn audio(&self) -> Option<&MediaRef> {
        self.audio.as_ref().filter(|m| !m.is_blank())
    }

    /// Typed notes, trimmed; `None` when blank
    pub fn free_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn hints(&self) -> Option<&WineHints> {
        self.hints.as_ref().filter(|h| !h.is_empty())
    }
}

/// Per-run switches
///
/// Every step is enabled by default. `timeout_ms` overrides the configured
/// session timeout for this run only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiProcessingOptions {
    pub enable_label_extraction: bool,
    pub enable_transcription: bool,
    pub enable_text_analysis: bool,
    pub enable_form_suggestion: bool,
    pub use_cache: bool,
    /// BCP-47 language hint for transcription (e.g. "en", "fr")
    pub language: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl Default for AiProcessingOptions {
    fn default() -> Self {
        Self {
            enable_label_extraction: true,
            enable_transcription: true,
            enable_text_analysis: true,
            enable_form_suggestion: true,
            use_cache: true,
            language: None,
            timeout_ms: None,
        }
    }
}

impl AiProcessingOptions {
    /// Enabled steps in execution order
    pub fn enabled_steps(&self) -> Vec<StepId> {
        StepId::ALL
            .into_iter()
            .filter(|id| self.is_enabled(*id))
            .collect()
    }

    pub fn is_enabled(&self, step: StepId) -> bool {
        match step {
            StepId::LabelExtraction => self.enable_label_extraction,
            StepId::SpeechTranscription => self.enable_transcription,
            StepId::TextAnalysis => self.enable_text_analysis,
            StepId::FormSuggestion => self.enable_form_suggestion,
        }
    }

    /// Options with every step disabled, for selectively enabling a few
    pub fn none_enabled() -> Self {
        Self {
            enable_label_extraction: false,
            enable_transcription: false,
            enable_text_analysis: false,
            enable_form_suggestion: false,
            ..Self::default()
        }
    }
}
