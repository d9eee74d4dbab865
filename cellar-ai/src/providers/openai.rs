//! OpenAI client: speech transcription and tasting-note analysis
//!
//! - Transcription: `POST /v1/audio/transcriptions` (multipart,
//!   `verbose_json` so segment log-probabilities can drive confidence)
//! - Analysis: `POST /v1/chat/completions` in JSON mode with a fixed
//!   schema prompt

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::models::{
    Appearance, Conclusion, Nose, Palate, Transcription, WineAnalysis, WineDetails, WineHints,
};
use crate::providers::{MediaPayload, ProviderError, SpeechTranscriber, TextAnalyzer};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Used when a transcript has text but no segment statistics
const DEFAULT_TRANSCRIPTION_CONFIDENCE: u8 = 75;

const ANALYSIS_PROMPT: &str = r#"You are a sommelier assistant. Read the user's wine tasting notes and return ONLY a JSON object with this shape:
{
  "wine": {"name": str|null, "producer": str|null, "vintage": int|null, "region": str|null, "country": str|null,
           "wine_type": "red"|"white"|"rosé"|"sparkling"|"dessert"|"fortified"|null, "grape_varieties": [str], "alcohol_content": number|null},
  "appearance": {"clarity": str|null, "intensity": str|null, "color": str|null},
  "nose": {"condition": str|null, "intensity": str|null, "development": str|null, "aromas": [str]},
  "palate": {"sweetness": str|null, "acidity": str|null, "tannin": str|null, "alcohol": str|null, "body": str|null,
             "flavor_intensity": str|null, "finish": str|null, "flavors": [str]},
  "conclusion": {"quality": str|null, "readiness": str|null, "rating": int 0-100|null, "notes": str|null},
  "summary": str|null,
  "confidence": int 0-100
}
Use null or [] for anything the notes do not mention. Never invent details. "confidence" is how sure you are that the fields reflect the notes."#;

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    transcription_model: String,
    analysis_model: String,
    timeout: Duration,
}

impl OpenAiClient {
    /// A client without a key fails every call with a configuration error
    pub fn new(
        api_key: Option<String>,
        transcription_model: impl Into<String>,
        analysis_model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            transcription_model: transcription_model.into(),
            analysis_model: analysis_model.into(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Configuration("OpenAI API key is not set".to_string()))
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<String, ProviderError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;
        if status.is_success() {
            Ok(text)
        } else {
            Err(ProviderError::from_status(status, &text))
        }
    }
}

#[async_trait]
impl SpeechTranscriber for OpenAiClient {
    async fn transcribe(
        &self,
        audio: &MediaPayload,
        language: Option<&str>,
    ) -> Result<Transcription, ProviderError> {
        let api_key = self.api_key()?;

        let file = reqwest::multipart::Part::bytes(audio.bytes.clone())
            .file_name(audio.file_name.clone())
            .mime_str(&audio.mime_type)
            .map_err(|e| ProviderError::Media(format!("invalid MIME type: {}", e)))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.transcription_model.clone())
            .text("response_format", "verbose_json");
        if let Some(language) = language.filter(|l| !l.trim().is_empty()) {
            form = form.text("language", language.trim().to_string());
        }

        debug!(
            bytes = audio.bytes.len(),
            model = %self.transcription_model,
            "Sending audio for transcription"
        );

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        let body = self.read_body(response).await?;
        parse_transcription(&body)
    }
}

#[async_trait]
impl TextAnalyzer for OpenAiClient {
    async fn analyze(
        &self,
        text: &str,
        hints: Option<&WineHints>,
    ) -> Result<WineAnalysis, ProviderError> {
        let api_key = self.api_key()?;

        let mut user_message = format!("Tasting notes:\n{}", text);
        if let Some(hints) = hints {
            let context = serde_json::to_string(hints).unwrap_or_default();
            user_message.push_str(&format!("\n\nKnown wine details (may be partial): {}", context));
        }

        let body = json!({
            "model": self.analysis_model,
            "temperature": 0.2,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": ANALYSIS_PROMPT },
                { "role": "user", "content": user_message }
            ]
        });

        debug!(chars = text.len(), model = %self.analysis_model, "Requesting tasting analysis");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        let body = self.read_body(response).await?;
        parse_analysis(&body)
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
    language: Option<String>,
    duration: Option<f32>,
    #[serde(default)]
    segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct Segment {
    avg_logprob: Option<f64>,
    no_speech_prob: Option<f64>,
}

/// Confidence is the mean per-segment `exp(avg_logprob) * (1 - no_speech_prob)`
pub(crate) fn parse_transcription(body: &str) -> Result<Transcription, ProviderError> {
    let parsed: TranscriptionResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("transcription response: {}", e)))?;

    let text = parsed.text.trim().to_string();

    let scores: Vec<f64> = parsed
        .segments
        .iter()
        .filter_map(|s| {
            let logprob = s.avg_logprob?;
            let speech = 1.0 - s.no_speech_prob.unwrap_or(0.0);
            Some(logprob.exp().clamp(0.0, 1.0) * speech.clamp(0.0, 1.0))
        })
        .collect();

    let confidence = if text.is_empty() {
        0
    } else if scores.is_empty() {
        DEFAULT_TRANSCRIPTION_CONFIDENCE
    } else {
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        (mean * 100.0).round().clamp(0.0, 100.0) as u8
    };

    Ok(Transcription {
        text,
        language: parsed.language,
        duration_secs: parsed.duration,
        confidence,
    })
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnalysisPayload {
    wine: WineDetails,
    appearance: Appearance,
    nose: Nose,
    palate: Palate,
    conclusion: Conclusion,
    summary: Option<String>,
    confidence: Option<f64>,
}

pub(crate) fn parse_analysis(body: &str) -> Result<WineAnalysis, ProviderError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("chat response: {}", e)))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ProviderError::InvalidResponse("chat response has no content".to_string()))?;

    let payload: AnalysisPayload = serde_json::from_str(strip_code_fence(&content))
        .map_err(|e| ProviderError::InvalidResponse(format!("analysis JSON: {}", e)))?;

    let mut analysis = WineAnalysis {
        wine: payload.wine,
        appearance: payload.appearance,
        nose: payload.nose,
        palate: payload.palate,
        conclusion: payload.conclusion,
        summary: payload.summary.filter(|s| !s.trim().is_empty()),
        confidence: 0,
    };
    analysis.conclusion.rating = analysis.conclusion.rating.filter(|r| *r <= 100);

    analysis.confidence = match payload.confidence {
        Some(c) if c.is_finite() => c.round().clamp(0.0, 100.0) as u8,
        _ => coverage_confidence(&analysis),
    };

    Ok(analysis)
}

/// Fallback when the model omits its own confidence
fn coverage_confidence(analysis: &WineAnalysis) -> u8 {
    if analysis.has_no_content() {
        return 0;
    }
    let sections = [
        !analysis.wine.is_empty(),
        !analysis.appearance.is_empty(),
        !analysis.nose.is_empty(),
        !analysis.palate.is_empty(),
        !analysis.conclusion.is_empty(),
    ]
    .into_iter()
    .filter(|present| *present)
    .count() as u32;
    (40 + sections * 10).min(90) as u8
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcription_confidence_from_segments() {
        let body = r#"{
            "text": " Deep ruby, blackcurrant and cedar. ",
            "language": "english",
            "duration": 6.5,
            "segments": [
                {"avg_logprob": 0.0, "no_speech_prob": 0.0},
                {"avg_logprob": -0.6931471805599453, "no_speech_prob": 0.0}
            ]
        }"#;
        let t = parse_transcription(body).unwrap();
        assert_eq!(t.text, "Deep ruby, blackcurrant and cedar.");
        assert_eq!(t.language.as_deref(), Some("english"));
        assert_eq!(t.duration_secs, Some(6.5));
        // mean(1.0, 0.5)
        assert_eq!(t.confidence, 75);
    }

    #[test]
    fn test_transcription_without_segments_uses_default() {
        let t = parse_transcription(r#"{"text": "hello"}"#).unwrap();
        assert_eq!(t.confidence, DEFAULT_TRANSCRIPTION_CONFIDENCE);
    }

    #[test]
    fn test_blank_transcription_has_zero_confidence() {
        let t = parse_transcription(r#"{"text": "   "}"#).unwrap();
        assert!(t.text.is_empty());
        assert_eq!(t.confidence, 0);
    }

    #[test]
    fn test_analysis_parses_model_json() {
        let content = r#"{"wine": {"producer": "Ridge", "vintage": 2019, "grape_varieties": ["Zinfandel"]},
            "palate": {"tannin": "medium", "flavors": ["bramble"]},
            "conclusion": {"rating": 92},
            "summary": "Juicy and spiced",
            "confidence": 83.6}"#;
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
        .to_string();

        let analysis = parse_analysis(&body).unwrap();
        assert_eq!(analysis.wine.producer.as_deref(), Some("Ridge"));
        assert_eq!(analysis.wine.grape_varieties, vec!["Zinfandel".to_string()]);
        assert_eq!(analysis.palate.tannin.as_deref(), Some("medium"));
        assert_eq!(analysis.conclusion.rating, Some(92));
        assert_eq!(analysis.confidence, 84);
    }

    #[test]
    fn test_analysis_accepts_fenced_json_and_derives_confidence() {
        let content = "```json\n{\"nose\": {\"aromas\": [\"citrus\"]}, \"palate\": {\"acidity\": \"high\"}}\n```";
        let body = json!({"choices": [{"message": {"content": content}}]}).to_string();

        let analysis = parse_analysis(&body).unwrap();
        assert_eq!(analysis.nose.aromas, vec!["citrus".to_string()]);
        assert_eq!(analysis.confidence, 60);
    }

    #[test]
    fn test_analysis_without_content_is_invalid() {
        let err = parse_analysis(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));

        let body = json!({"choices": [{"message": {"content": "not json"}}]}).to_string();
        assert!(matches!(
            parse_analysis(&body).unwrap_err(),
            ProviderError::InvalidResponse(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_key_is_configuration_error() {
        let client = OpenAiClient::new(None, "whisper-1", "gpt-4o-mini", Duration::from_secs(1));
        let err = client.analyze("cherry", None).await.unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }
}
