//! Settings API endpoints
//!
//! Provides POST /api/settings/vision_api_key and
//! POST /api/settings/openai_api_key for configuring provider keys at runtime.

use crate::config::resolve_provider_keys;
use crate::providers::ProviderId;
use crate::{ApiError, ApiResult, AppState};
use axum::{extract::State, routing::post, Json, Router};
use cellar_common::config::{load_toml_config, write_toml_config, TomlConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Request payload for setting a provider API key
#[derive(Debug, Deserialize)]
pub struct SetApiKeyRequest {
    pub api_key: String,
}

/// Response payload for API key configuration
#[derive(Debug, Serialize)]
pub struct SetApiKeyResponse {
    /// Whether the operation succeeded
    pub success: bool,
    /// Human-readable status message
    pub message: String,
}

/// POST /api/settings/vision_api_key
pub async fn set_vision_api_key(
    State(state): State<AppState>,
    Json(payload): Json<SetApiKeyRequest>,
) -> ApiResult<Json<SetApiKeyResponse>> {
    store_provider_key(&state, ProviderId::Vision, payload.api_key).await
}

/// POST /api/settings/openai_api_key
pub async fn set_openai_api_key(
    State(state): State<AppState>,
    Json(payload): Json<SetApiKeyRequest>,
) -> ApiResult<Json<SetApiKeyResponse>> {
    store_provider_key(&state, ProviderId::Language, payload.api_key).await
}

/// Validate, write to the database (authoritative), sync to TOML (best-effort),
/// then rebuild the orchestrator so the next session uses the new key.
///
/// TOML write failures log warnings but do not fail the request.
async fn store_provider_key(
    state: &AppState,
    provider: ProviderId,
    api_key: String,
) -> ApiResult<Json<SetApiKeyResponse>> {
    if !crate::config::is_valid_key(&api_key) {
        return Err(ApiError::BadRequest(
            "API key cannot be empty or whitespace-only".to_string(),
        ));
    }
    let api_key = api_key.trim().to_string();

    let label = match provider {
        ProviderId::Vision => {
            crate::db::settings::set_vision_api_key(&state.db, api_key.clone()).await
        }
        ProviderId::Language => {
            crate::db::settings::set_openai_api_key(&state.db, api_key.clone()).await
        }
    }
    .map(|()| provider_label(provider))
    .map_err(|e| ApiError::Internal(format!("Failed to save API key to database: {}", e)))?;

    info!("{} API key configured via settings endpoint", label);

    let mut toml_config = match state.toml_path.as_deref() {
        Some(path) => read_toml_or_default(path),
        None => TomlConfig::default(),
    };

    match provider {
        ProviderId::Vision => toml_config.vision_api_key = Some(api_key),
        ProviderId::Language => toml_config.openai_api_key = Some(api_key),
    }

    if let Some(path) = state.toml_path.as_deref() {
        match write_toml_config(&toml_config, path) {
            Ok(()) => info!("API key synced to TOML: {}", path.display()),
            Err(e) => warn!("TOML sync failed (database write succeeded): {}", e),
        }
    }

    let keys = resolve_provider_keys(&state.db, &toml_config).await?;
    state
        .replace_orchestrator(state.services.build_orchestrator(&keys))
        .await;

    Ok(Json(SetApiKeyResponse {
        success: true,
        message: format!("{} API key configured successfully", label),
    }))
}

fn provider_label(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::Vision => "Vision",
        ProviderId::Language => "OpenAI",
    }
}

fn read_toml_or_default(path: &Path) -> TomlConfig {
    if !path.exists() {
        return TomlConfig::default();
    }
    load_toml_config(path).unwrap_or_else(|e| {
        warn!("{} - rewriting from defaults", e);
        TomlConfig::default()
    })
}

/// Build settings routes
pub fn settings_routes() -> Router<AppState> {
    Router::new()
        .route("/api/settings/vision_api_key", post(set_vision_api_key))
        .route("/api/settings/openai_api_key", post(set_openai_api_key))
}
