//! Configuration resolution for cellar-ai
//!
//! Tuning values come from the `[ai]` table of the TOML file with built-in
//! defaults. Provider API keys resolve with Database → ENV → TOML priority.
//! A resolved [`AiConfig`] is immutable; changing it means building a new
//! pipeline.

use cellar_common::config::{AiTuning, TomlConfig};
use cellar_common::Result;
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

use crate::providers::ProviderId;
use crate::services::RateLimitConfig;

pub const VISION_API_KEY_ENV: &str = "CELLAR_VISION_API_KEY";
pub const OPENAI_API_KEY_ENV: &str = "CELLAR_OPENAI_API_KEY";

pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
pub const DEFAULT_ANALYSIS_MODEL: &str = "gpt-4o-mini";

/// Retry, caching and rate-limit switches for one provider adapter
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterConfig {
    /// Total attempts per call, including the first
    pub max_retries: u32,
    /// Delay before retry n is `n * base_delay`
    pub base_delay: Duration,
    pub cache_enabled: bool,
    pub rate_limit_enabled: bool,
    /// Results below this confidence are not cached
    pub cache_min_confidence: u8,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            cache_enabled: true,
            rate_limit_enabled: true,
            cache_min_confidence: 50,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Resolved AI pipeline configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AiConfig {
    pub adapter: AdapterConfig,
    pub vision_limits: RateLimitConfig,
    pub language_limits: RateLimitConfig,
    pub cache_ttl: Duration,
    pub session_timeout: Duration,
    pub transcription_model: String,
    pub analysis_model: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            adapter: AdapterConfig::default(),
            vision_limits: RateLimitConfig {
                per_minute: 30,
                per_day: 1000,
            },
            language_limits: RateLimitConfig {
                per_minute: 20,
                per_day: 500,
            },
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            session_timeout: Duration::from_millis(60_000),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            analysis_model: DEFAULT_ANALYSIS_MODEL.to_string(),
        }
    }
}

impl AiConfig {
    /// Apply TOML overrides on top of the defaults
    pub fn from_tuning(tuning: &AiTuning) -> Self {
        let defaults = Self::default();
        let adapter = AdapterConfig {
            max_retries: tuning
                .max_retries
                .unwrap_or(defaults.adapter.max_retries)
                .max(1),
            base_delay: tuning
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.adapter.base_delay),
            cache_enabled: tuning.cache_enabled.unwrap_or(defaults.adapter.cache_enabled),
            rate_limit_enabled: tuning
                .rate_limit_enabled
                .unwrap_or(defaults.adapter.rate_limit_enabled),
            cache_min_confidence: tuning
                .cache_min_confidence
                .unwrap_or(defaults.adapter.cache_min_confidence)
                .min(100),
            request_timeout: defaults.adapter.request_timeout,
        };

        Self {
            adapter,
            vision_limits: RateLimitConfig {
                per_minute: tuning
                    .vision_per_minute
                    .unwrap_or(defaults.vision_limits.per_minute),
                per_day: tuning.vision_per_day.unwrap_or(defaults.vision_limits.per_day),
            },
            language_limits: RateLimitConfig {
                per_minute: tuning
                    .language_per_minute
                    .unwrap_or(defaults.language_limits.per_minute),
                per_day: tuning
                    .language_per_day
                    .unwrap_or(defaults.language_limits.per_day),
            },
            cache_ttl: tuning
                .cache_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            session_timeout: tuning
                .session_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.session_timeout),
            transcription_model: tuning
                .transcription_model
                .clone()
                .filter(|m| is_valid_key(m))
                .unwrap_or(defaults.transcription_model),
            analysis_model: tuning
                .analysis_model
                .clone()
                .filter(|m| is_valid_key(m))
                .unwrap_or(defaults.analysis_model),
        }
    }

    pub fn rate_limits(&self) -> HashMap<ProviderId, RateLimitConfig> {
        HashMap::from([
            (ProviderId::Vision, self.vision_limits),
            (ProviderId::Language, self.language_limits),
        ])
    }
}

/// Resolved provider API keys; `None` leaves that provider unconfigured
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderKeys {
    pub vision: Option<String>,
    pub openai: Option<String>,
}

/// Resolve both provider keys
pub async fn resolve_provider_keys(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<ProviderKeys> {
    let vision = resolve_api_key(
        "Vision",
        crate::db::settings::get_vision_api_key(db).await?,
        std::env::var(VISION_API_KEY_ENV).ok(),
        toml_config.vision_api_key.clone(),
    );
    let openai = resolve_api_key(
        "OpenAI",
        crate::db::settings::get_openai_api_key(db).await?,
        std::env::var(OPENAI_API_KEY_ENV).ok(),
        toml_config.openai_api_key.clone(),
    );

    Ok(ProviderKeys { vision, openai })
}

/// Pick the highest-priority valid key among database, environment and TOML
///
/// Warns when more than one source holds a valid key.
pub fn resolve_api_key(
    label: &str,
    db_key: Option<String>,
    env_key: Option<String>,
    toml_key: Option<String>,
) -> Option<String> {
    let candidates = [
        ("database", db_key),
        ("environment", env_key),
        ("TOML", toml_key),
    ];

    let valid: Vec<(&str, String)> = candidates
        .into_iter()
        .filter_map(|(source, key)| key.filter(|k| is_valid_key(k)).map(|k| (source, k)))
        .collect();

    if valid.len() > 1 {
        let sources: Vec<&str> = valid.iter().map(|(s, _)| *s).collect();
        warn!(
            "{} API key found in multiple sources: {}. Using {} (highest priority).",
            label,
            sources.join(", "),
            sources[0]
        );
    }

    match valid.into_iter().next() {
        Some((source, key)) => {
            info!("{} API key loaded from {}", label, source);
            Some(key.trim().to_string())
        }
        None => {
            warn!(
                "{} API key not configured; set it via POST /api/settings, the environment or the TOML config",
                label
            );
            None
        }
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
