//! Processing endpoints
//!
//! POST /ai/process runs one session synchronously and returns it. Finished
//! sessions can be fetched again from the cache and turned into a tasting
//! note record.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    AiProcessingInput, AiProcessingOptions, ProcessingSession, StepStatus, TastingNoteRecord,
};
use crate::services::CacheStore;
use crate::{ApiError, ApiResult, AppState};

/// Request body for POST /ai/process
#[derive(Debug, Default, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub input: AiProcessingInput,
    #[serde(default)]
    pub options: AiProcessingOptions,
}

/// Request body for POST /ai/sessions/:id/record
#[derive(Debug, Deserialize)]
pub struct CreateRecordRequest {
    pub user_id: String,
}

/// POST /ai/process
pub async fn process(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> ApiResult<Json<ProcessingSession>> {
    let orchestrator = state.orchestrator().await;

    let session = orchestrator
        .run(&request.input, &request.options, |steps| {
            let done = steps.iter().filter(|s| s.status.is_terminal()).count();
            let running = steps
                .iter()
                .find(|s| s.status == StepStatus::Processing)
                .map(|s| s.id.as_str());
            debug!(done, total = steps.len(), running, "Session progress");
        })
        .await?;

    if let Some(error) = &session.error {
        let message = format!("Session {}: {}", session.session_id, error);
        *state.last_error.write().await = Some(message);
    }

    info!(
        session_id = %session.session_id,
        confidence = session.confidence,
        processing_time_ms = session.processing_time_ms,
        "Session returned to caller"
    );

    Ok(Json(session))
}

/// GET /ai/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<ProcessingSession>> {
    load_session(&state, session_id).await.map(Json)
}

/// POST /ai/sessions/:id/record
pub async fn create_record(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<CreateRecordRequest>,
) -> ApiResult<Json<TastingNoteRecord>> {
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(ApiError::BadRequest("user_id cannot be empty".to_string()));
    }

    let session = load_session(&state, session_id).await?;
    Ok(Json(TastingNoteRecord::from_session(&session, user_id)))
}

async fn load_session(state: &AppState, session_id: Uuid) -> ApiResult<ProcessingSession> {
    state
        .services
        .cache
        .get::<ProcessingSession>(&CacheStore::session_key(session_id))
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session {} not found or expired", session_id)))
}

/// Build processing routes
pub fn process_routes() -> Router<AppState> {
    Router::new()
        .route("/ai/process", post(process))
        .route("/ai/sessions/:id", get(get_session))
        .route("/ai/sessions/:id/record", post(create_record))
}
