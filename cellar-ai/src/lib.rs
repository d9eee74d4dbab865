//! cellar-ai library interface
//!
//! AI orchestration for wine label photos and spoken tasting notes: provider
//! adapters with caching, rate limiting and retry, a staged pipeline that
//! produces a confidence-scored session, and the HTTP surface around it.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::pipeline::{AiServices, PipelineOrchestrator};

/// Module name used for the TOML file and health reporting
pub const MODULE_NAME: &str = "cellar-ai";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Cache, rate limiter, usage stats and session log shared by every orchestrator
    pub services: AiServices,
    /// Current orchestrator; replaced wholesale when a provider key changes
    pub orchestrator: Arc<RwLock<Arc<PipelineOrchestrator>>>,
    /// TOML file that settings changes are mirrored to, if any
    pub toml_path: Option<PathBuf>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, services: AiServices, orchestrator: PipelineOrchestrator) -> Self {
        Self {
            db,
            services,
            orchestrator: Arc::new(RwLock::new(Arc::new(orchestrator))),
            toml_path: None,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_toml_path(mut self, path: Option<PathBuf>) -> Self {
        self.toml_path = path;
        self
    }

    /// Snapshot of the current orchestrator
    ///
    /// Sessions already running keep the instance they started with.
    pub async fn orchestrator(&self) -> Arc<PipelineOrchestrator> {
        self.orchestrator.read().await.clone()
    }

    pub async fn replace_orchestrator(&self, orchestrator: PipelineOrchestrator) {
        *self.orchestrator.write().await = Arc::new(orchestrator);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::process_routes())
        .merge(api::stats_routes())
        .merge(api::settings_routes())
        .merge(api::health_routes())
        .with_state(state)
}
