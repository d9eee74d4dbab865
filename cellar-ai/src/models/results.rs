//! Structured provider results and the suggested tasting form

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifying details of a wine, as read from a label or notes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WineDetails {
    pub name: Option<String>,
    pub producer: Option<String>,
    pub vintage: Option<i32>,
    pub region: Option<String>,
    pub country: Option<String>,
    /// red, white, rosé, sparkling, dessert or fortified
    pub wine_type: Option<String>,
    pub grape_varieties: Vec<String>,
    /// Percent ABV
    pub alcohol_content: Option<f32>,
}

impl WineDetails {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.producer.is_none()
            && self.vintage.is_none()
            && self.region.is_none()
            && self.country.is_none()
            && self.wine_type.is_none()
            && self.grape_varieties.is_empty()
            && self.alcohol_content.is_none()
    }

    /// Number of populated fields, used for coverage-based confidence
    pub fn populated_fields(&self) -> usize {
        [
            self.name.is_some(),
            self.producer.is_some(),
            self.vintage.is_some(),
            self.region.is_some(),
            self.country.is_some(),
            self.wine_type.is_some(),
            !self.grape_varieties.is_empty(),
            self.alcohol_content.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}

/// Result of reading a label photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelExtraction {
    /// Full detected text, line breaks preserved
    pub raw_text: String,
    pub wine: WineDetails,
    /// 0-100
    pub confidence: u8,
}

/// Result of transcribing spoken notes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub language: Option<String>,
    pub duration_secs: Option<f32>,
    /// 0-100
    pub confidence: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Appearance {
    pub clarity: Option<String>,
    pub intensity: Option<String>,
    pub color: Option<String>,
}

impl Appearance {
    pub fn is_empty(&self) -> bool {
        self.clarity.is_none() && self.intensity.is_none() && self.color.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Nose {
    pub condition: Option<String>,
    pub intensity: Option<String>,
    pub development: Option<String>,
    pub aromas: Vec<String>,
}

impl Nose {
    pub fn is_empty(&self) -> bool {
        self.condition.is_none()
            && self.intensity.is_none()
            && self.development.is_none()
            && self.aromas.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palate {
    pub sweetness: Option<String>,
    pub acidity: Option<String>,
    pub tannin: Option<String>,
    pub alcohol: Option<String>,
    pub body: Option<String>,
    pub flavor_intensity: Option<String>,
    pub finish: Option<String>,
    pub flavors: Vec<String>,
}

impl Palate {
    pub fn is_empty(&self) -> bool {
        self.sweetness.is_none()
            && self.acidity.is_none()
            && self.tannin.is_none()
            && self.alcohol.is_none()
            && self.body.is_none()
            && self.flavor_intensity.is_none()
            && self.finish.is_none()
            && self.flavors.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conclusion {
    pub quality: Option<String>,
    pub readiness: Option<String>,
    /// 0-100 point score
    pub rating: Option<u8>,
    pub notes: Option<String>,
}

impl Conclusion {
    pub fn is_empty(&self) -> bool {
        self.quality.is_none()
            && self.readiness.is_none()
            && self.rating.is_none()
            && self.notes.is_none()
    }
}

/// Structured reading of free-form tasting notes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WineAnalysis {
    /// Wine details mentioned in the notes
    #[serde(default)]
    pub wine: WineDetails,
    #[serde(default)]
    pub appearance: Appearance,
    #[serde(default)]
    pub nose: Nose,
    #[serde(default)]
    pub palate: Palate,
    #[serde(default)]
    pub conclusion: Conclusion,
    pub summary: Option<String>,
    /// 0-100
    pub confidence: u8,
}

impl WineAnalysis {
    /// True when the analysis carries no usable field at all
    pub fn has_no_content(&self) -> bool {
        self.wine.is_empty()
            && self.appearance.is_empty()
            && self.nose.is_empty()
            && self.palate.is_empty()
            && self.conclusion.is_empty()
            && self.summary.is_none()
    }
}

/// Where a suggested form value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Label,
    Analysis,
    Hints,
}

/// Pre-filled tasting form
///
/// `sources` maps each populated field path (e.g. `wine.producer`,
/// `palate.acidity`) to the input it was taken from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormSuggestion {
    pub wine: WineDetails,
    pub appearance: Appearance,
    pub nose: Nose,
    pub palate: Palate,
    pub conclusion: Conclusion,
    pub sources: BTreeMap<String, FieldSource>,
}

impl FormSuggestion {
    pub fn source_of(&self, field: &str) -> Option<FieldSource> {
        self.sources.get(field).copied()
    }
}
