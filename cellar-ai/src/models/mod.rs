//! Data models for the AI processing pipeline

pub mod input;
pub mod record;
pub mod results;
pub mod session;

pub use input::{AiProcessingInput, AiProcessingOptions, MediaRef, WineHints};
pub use record::TastingNoteRecord;
pub use results::{
    Appearance, Conclusion, FieldSource, FormSuggestion, LabelExtraction, Nose, Palate,
    Transcription, WineAnalysis, WineDetails,
};
pub use session::{
    aggregate_confidence, InvalidTransition, ProcessingSession, ProcessingStep, StepId,
    StepResult, StepStatus,
};
