//! HTTP API handlers for cellar-ai

pub mod health;
pub mod process;
pub mod settings;
pub mod stats;

pub use health::health_routes;
pub use process::process_routes;
pub use settings::settings_routes;
pub use stats::stats_routes;
