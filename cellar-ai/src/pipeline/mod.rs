//! AI processing pipeline

pub mod builder;
pub mod form_suggestion;
pub mod orchestrator;

use thiserror::Error;

pub use builder::AiServices;
pub use form_suggestion::suggest_form;
pub use orchestrator::{PipelineConfig, PipelineOrchestrator};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Options disabled every step; nothing to run
    #[error("No processing steps enabled")]
    NoStepsEnabled,

    /// Step results could not be merged into a form
    #[error("Form mapping failed: {0}")]
    FormMapping(String),
}
