//! External AI providers
//!
//! Two provider families sit behind [`adapter::ProviderAdapter`]:
//! - **Vision** ([`LabelReader`]): reads the text on a label photo
//! - **Language** ([`SpeechTranscriber`], [`TextAnalyzer`]): turns speech into
//!   text and free text into a structured tasting analysis
//!
//! Concrete clients live in [`google_vision`] and [`openai`]; tests supply
//! their own implementations of the traits.

pub mod adapter;
pub mod google_vision;
pub mod label_parser;
pub mod language;
pub mod media;
pub mod openai;
pub mod vision;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::models::{LabelExtraction, Transcription, WineAnalysis, WineHints};

pub use adapter::{AdapterOutcome, AdapterResult, ProviderAdapter, ProviderOutput};
pub use language::LanguageAdapter;
pub use media::{DefaultMediaResolver, MediaPayload, MediaResolver};
pub use vision::VisionAdapter;

/// Provider family; rate limits and usage stats are tracked per family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    Vision,
    Language,
}

impl ProviderId {
    pub const ALL: [ProviderId; 2] = [ProviderId::Vision, ProviderId::Language];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Vision => "vision",
            ProviderId::Language => "language",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider call failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Missing or rejected credentials; never retried
    #[error("Provider not configured: {0}")]
    Configuration(String),

    #[error("Rate limit exceeded for {0} provider")]
    RateLimited(ProviderId),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// Input media could not be read
    #[error("Media unavailable: {0}")]
    Media(String),
}

impl ProviderError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Network(_)
            | ProviderError::Timeout(_)
            | ProviderError::InvalidResponse(_) => true,
            ProviderError::Api { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            ProviderError::Configuration(_)
            | ProviderError::RateLimited(_)
            | ProviderError::Media(_) => false,
        }
    }

    /// Map a non-success HTTP status to an error
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = extract_error_message(body);
        match status.as_u16() {
            401 | 403 => ProviderError::Configuration(format!(
                "credentials rejected (HTTP {}): {}",
                status.as_u16(),
                message
            )),
            code => ProviderError::Api {
                status: code,
                message,
            },
        }
    }

    /// Map a transport-level reqwest failure
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(timeout)
        } else if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

/// Pull `error.message` out of a JSON error body, else return the body trimmed
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().chars().take(300).collect())
}

/// Reads wine label photos
#[async_trait]
pub trait LabelReader: Send + Sync {
    async fn read_label(
        &self,
        image: &MediaPayload,
        hints: Option<&WineHints>,
    ) -> Result<LabelExtraction, ProviderError>;
}

/// Converts spoken notes to text
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: &MediaPayload,
        language: Option<&str>,
    ) -> Result<Transcription, ProviderError>;
}

/// Turns free-form tasting notes into a structured analysis
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        text: &str,
        hints: Option<&WineHints>,
    ) -> Result<WineAnalysis, ProviderError>;
}
