//! cellar-ai - AI orchestration microservice
//!
//! Turns a wine label photo and/or a spoken tasting note into a structured,
//! confidence-scored tasting form by coordinating label text detection,
//! speech transcription and tasting-note analysis.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cellar_ai::config::{resolve_provider_keys, AiConfig};
use cellar_ai::pipeline::AiServices;
use cellar_ai::{AppState, MODULE_NAME};
use cellar_common::config::{
    config_file_path, load_module_config, RootFolderInitializer, RootFolderResolver,
};
use cellar_common::SystemClock;

const DEFAULT_PORT: u16 = 5730;

/// Command-line arguments for cellar-ai
#[derive(Parser, Debug)]
#[command(name = "cellar-ai")]
#[command(about = "AI orchestration microservice for Cellar")]
#[command(version)]
struct Args {
    /// Port to listen on (falls back to the TOML config, then 5730)
    #[arg(short, long, env = "CELLAR_AI_PORT")]
    port: Option<u16>,

    /// Root folder containing the database
    #[arg(short, long, env = "CELLAR_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config = load_module_config(MODULE_NAME);

    // RUST_LOG wins over the TOML level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&toml_config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cellar-ai (AI Orchestration) microservice");
    info!(
        "Version: {} ({}, {} build, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TIMESTAMP")
    );

    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .map_err(|e| anyhow::anyhow!("Failed to initialize root folder: {}", e))?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = cellar_ai::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;
    info!("Database connection established");

    let config = AiConfig::from_tuning(&toml_config.ai);
    let keys = resolve_provider_keys(&db_pool, &toml_config)
        .await
        .context("Failed to resolve provider API keys")?;

    let services = AiServices::new(db_pool.clone(), config, Arc::new(SystemClock));
    let orchestrator = services.build_orchestrator(&keys);
    info!(
        vision_configured = keys.vision.is_some(),
        openai_configured = keys.openai.is_some(),
        "AI pipeline initialized"
    );

    let state = AppState::new(db_pool, services, orchestrator)
        .with_toml_path(config_file_path(MODULE_NAME));
    let app = cellar_ai::build_router(state).layer(TraceLayer::new_for_http());

    let port = args.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
