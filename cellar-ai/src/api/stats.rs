//! Statistics endpoints

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::services::{ProcessingStats, ProviderUsage, RateLimitUsage};
use crate::AppState;

/// One provider's entry in GET /ai/usage
#[derive(Debug, Serialize)]
pub struct ProviderUsageEntry {
    pub provider: String,
    pub today: ProviderUsage,
    pub this_month: ProviderUsage,
    /// Live counts for the current minute and day windows
    pub rate_limit: RateLimitUsage,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub providers: Vec<ProviderUsageEntry>,
}

/// GET /ai/stats
pub async fn processing_stats(State(state): State<AppState>) -> Json<ProcessingStats> {
    Json(state.services.session_log.processing_stats().await)
}

/// GET /ai/usage
pub async fn provider_usage(State(state): State<AppState>) -> Json<UsageResponse> {
    let providers = state
        .services
        .usage
        .report()
        .await
        .into_iter()
        .map(|report| ProviderUsageEntry {
            provider: report.provider.to_string(),
            rate_limit: state.services.limiter.usage(report.provider),
            today: report.today,
            this_month: report.this_month,
        })
        .collect();

    Json(UsageResponse { providers })
}

/// Build statistics routes
pub fn stats_routes() -> Router<AppState> {
    Router::new()
        .route("/ai/stats", get(processing_stats))
        .route("/ai/usage", get(provider_usage))
}
