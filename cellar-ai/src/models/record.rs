//! Flat tasting-note record built from a finished session
//!
//! Absent values are omitted from the serialized record rather than filled
//! with placeholder values.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{FormSuggestion, ProcessingSession};
use crate::pipeline::form_suggestion::suggest_form;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TastingNoteRecord {
    pub user_id: String,
    pub ai_session_id: Uuid,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub wine_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vintage: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wine_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grape_varieties: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alcohol_content: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub appearance_clarity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appearance_intensity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appearance_color: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nose_condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nose_intensity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nose_development: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nose_aromas: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub palate_sweetness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub palate_acidity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub palate_tannin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub palate_alcohol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub palate_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub palate_flavor_intensity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub palate_finish: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub palate_flavors: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion_quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion_readiness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcribed_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typed_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_confidence: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription_confidence: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_confidence: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_confidence: Option<u8>,
}

impl TastingNoteRecord {
    /// Flatten a session into a record owned by `user_id`
    ///
    /// Uses the session's form suggestion when that step completed, otherwise
    /// derives one from whatever label and analysis results are present.
    pub fn from_session(session: &ProcessingSession, user_id: &str) -> Self {
        let form = session.form_suggestion().cloned().unwrap_or_else(|| {
            suggest_form(session.label(), session.analysis(), None).unwrap_or_else(|e| {
                tracing::warn!(
                    session_id = %session.session_id,
                    error = %e,
                    "Could not derive form for record, leaving tasting fields empty"
                );
                FormSuggestion::default()
            })
        });

        let FormSuggestion {
            wine,
            appearance,
            nose,
            palate,
            conclusion,
            ..
        } = form;

        let notes = conclusion
            .notes
            .or_else(|| session.analysis().and_then(|a| a.summary.clone()));

        Self {
            user_id: user_id.to_string(),
            ai_session_id: session.session_id,

            wine_name: wine.name,
            producer: wine.producer,
            vintage: wine.vintage,
            region: wine.region,
            country: wine.country,
            wine_type: wine.wine_type,
            grape_varieties: wine.grape_varieties,
            alcohol_content: wine.alcohol_content,

            appearance_clarity: appearance.clarity,
            appearance_intensity: appearance.intensity,
            appearance_color: appearance.color,

            nose_condition: nose.condition,
            nose_intensity: nose.intensity,
            nose_development: nose.development,
            nose_aromas: nose.aromas,

            palate_sweetness: palate.sweetness,
            palate_acidity: palate.acidity,
            palate_tannin: palate.tannin,
            palate_alcohol: palate.alcohol,
            palate_body: palate.body,
            palate_flavor_intensity: palate.flavor_intensity,
            palate_finish: palate.finish,
            palate_flavors: palate.flavors,

            conclusion_quality: conclusion.quality,
            conclusion_readiness: conclusion.readiness,
            rating: conclusion.rating,
            notes,

            transcribed_text: session.transcription().map(|t| t.text.clone()),
            typed_notes: session.typed_notes.clone(),
            label_text: session.label().map(|l| l.raw_text.clone()),

            label_confidence: session.label().map(|l| l.confidence),
            transcription_confidence: session.transcription().map(|t| t.confidence),
            analysis_confidence: session.analysis().map(|a| a.confidence),
            overall_confidence: session.has_confidence().then_some(session.confidence),
        }
    }
}
