//! Google Cloud Vision text detection client
//!
//! Sends the label image to `images:annotate` with `TEXT_DETECTION` and
//! parses the detected text locally into [`WineDetails`].

use async_trait::async_trait;
use base64::Engine;
use chrono::Datelike;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::models::{LabelExtraction, WineHints};
use crate::providers::label_parser::{apply_hints, parse_label_text};
use crate::providers::{LabelReader, MediaPayload, ProviderError};

const VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";

/// Confidence assumed when the API returns text but no page confidence
const DEFAULT_OCR_CONFIDENCE: f64 = 70.0;

pub struct GoogleVisionClient {
    http: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    timeout: Duration,
}

impl GoogleVisionClient {
    /// A client without a key fails every call with a configuration error
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            endpoint: VISION_ENDPOINT.to_string(),
            timeout,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl LabelReader for GoogleVisionClient {
    async fn read_label(
        &self,
        image: &MediaPayload,
        hints: Option<&WineHints>,
    ) -> Result<LabelExtraction, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ProviderError::Configuration("Google Cloud Vision API key is not set".to_string())
        })?;

        let body = json!({
            "requests": [{
                "image": {
                    "content": base64::engine::general_purpose::STANDARD.encode(&image.bytes)
                },
                "features": [{ "type": "TEXT_DETECTION" }],
                "imageContext": { "languageHints": ["en", "fr", "it", "es", "de", "pt"] }
            }]
        });

        debug!(bytes = image.bytes.len(), "Sending label image to Vision API");

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        if !status.is_success() {
            return Err(ProviderError::from_status(status, &text));
        }

        parse_annotate_response(&text, hints, chrono::Utc::now().year())
    }
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResult {
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    full_text_annotation: Option<FullTextAnnotation>,
    error: Option<StatusBody>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct FullTextAnnotation {
    #[serde(default)]
    text: String,
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Turn an `images:annotate` body into a label extraction
///
/// Confidence is the OCR page confidence scaled by how many wine fields
/// the parser recognized: `ocr * (0.6 + 0.4 * coverage)`, where coverage
/// counts name, producer, vintage and type-or-grape out of four.
pub(crate) fn parse_annotate_response(
    body: &str,
    hints: Option<&WineHints>,
    current_year: i32,
) -> Result<LabelExtraction, ProviderError> {
    let parsed: AnnotateResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("Vision response: {}", e)))?;

    let result = parsed.responses.into_iter().next().unwrap_or_default();

    if let Some(error) = result.error {
        return Err(ProviderError::Api {
            status: u16::try_from(error.code).unwrap_or(500),
            message: error.message,
        });
    }

    let (raw_text, page_confidence) = match result.full_text_annotation {
        Some(full) if !full.text.trim().is_empty() => {
            let confidences: Vec<f64> = full.pages.iter().filter_map(|p| p.confidence).collect();
            let mean = (!confidences.is_empty())
                .then(|| confidences.iter().sum::<f64>() / confidences.len() as f64);
            (full.text, mean)
        }
        _ => (
            result
                .text_annotations
                .into_iter()
                .next()
                .map(|a| a.description)
                .unwrap_or_default(),
            None,
        ),
    };

    let raw_text = raw_text.trim().to_string();
    if raw_text.is_empty() {
        return Ok(LabelExtraction {
            raw_text,
            wine: Default::default(),
            confidence: 0,
        });
    }

    let mut wine = parse_label_text(&raw_text, current_year);
    let coverage = [
        wine.name.is_some(),
        wine.producer.is_some(),
        wine.vintage.is_some(),
        wine.wine_type.is_some() || !wine.grape_varieties.is_empty(),
    ]
    .into_iter()
    .filter(|found| *found)
    .count() as f64
        / 4.0;
    apply_hints(&mut wine, hints);

    let ocr = page_confidence
        .map(|c| c * 100.0)
        .unwrap_or(DEFAULT_OCR_CONFIDENCE);
    let confidence = (ocr * (0.6 + 0.4 * coverage)).round().clamp(0.0, 100.0) as u8;

    Ok(LabelExtraction {
        raw_text,
        wine,
        confidence,
    })
}
