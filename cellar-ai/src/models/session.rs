//! Processing session and step state machine
//!
//! Step lifecycle:
//! ```text
//! pending ──► processing ──► completed
//!    │             └───────► failed
//!    └──► skipped
//! ```
//! Terminal states never change. A run-level error or timeout may force any
//! non-terminal step straight to `failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{FormSuggestion, LabelExtraction, Transcription, WineAnalysis};

/// Pipeline steps in fixed execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepId {
    LabelExtraction,
    SpeechTranscription,
    TextAnalysis,
    FormSuggestion,
}

impl StepId {
    pub const ALL: [StepId; 4] = [
        StepId::LabelExtraction,
        StepId::SpeechTranscription,
        StepId::TextAnalysis,
        StepId::FormSuggestion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::LabelExtraction => "label-extraction",
            StepId::SpeechTranscription => "speech-transcription",
            StepId::TextAnalysis => "text-analysis",
            StepId::FormSuggestion => "form-suggestion",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StepId::LabelExtraction => "Label extraction",
            StepId::SpeechTranscription => "Speech transcription",
            StepId::TextAnalysis => "Tasting note analysis",
            StepId::FormSuggestion => "Form suggestion",
        }
    }

    pub fn parse(value: &str) -> Option<StepId> {
        StepId::ALL.into_iter().find(|id| id.as_str() == value)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Processing => "processing",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

/// Output carried by a completed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum StepResult {
    Label(LabelExtraction),
    Transcription(Transcription),
    Analysis(WineAnalysis),
    Form(FormSuggestion),
}

impl StepResult {
    /// Provider confidence; form suggestions carry none
    pub fn confidence(&self) -> Option<u8> {
        match self {
            StepResult::Label(label) => Some(label.confidence),
            StepResult::Transcription(transcription) => Some(transcription.confidence),
            StepResult::Analysis(analysis) => Some(analysis.confidence),
            StepResult::Form(_) => None,
        }
    }
}

/// Attempted a transition the step lifecycle does not allow
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Step {step} cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub step: StepId,
    pub from: &'static str,
    pub to: &'static str,
}

/// One step of a processing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStep {
    pub id: StepId,
    pub name: String,
    pub status: StepStatus,
    /// 0-100, never decreases
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub from_cache: bool,
}

impl ProcessingStep {
    pub fn new(id: StepId) -> Self {
        Self {
            id,
            name: id.display_name().to_string(),
            status: StepStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            skip_reason: None,
            duration_ms: None,
            from_cache: false,
        }
    }

    fn expect_status(
        &self,
        expected: StepStatus,
        to: StepStatus,
    ) -> Result<(), InvalidTransition> {
        if self.status == expected {
            Ok(())
        } else {
            Err(InvalidTransition {
                step: self.id,
                from: self.status.as_str(),
                to: to.as_str(),
            })
        }
    }

    fn advance_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
    }

    /// pending → processing
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.expect_status(StepStatus::Pending, StepStatus::Processing)?;
        self.status = StepStatus::Processing;
        self.advance_progress(10);
        Ok(())
    }

    /// processing → completed; `result` is `None` when the provider found nothing
    pub fn complete(
        &mut self,
        result: Option<StepResult>,
        duration_ms: u64,
        from_cache: bool,
    ) -> Result<(), InvalidTransition> {
        self.expect_status(StepStatus::Processing, StepStatus::Completed)?;
        self.status = StepStatus::Completed;
        self.result = result;
        self.duration_ms = Some(duration_ms);
        self.from_cache = from_cache;
        self.advance_progress(100);
        Ok(())
    }

    /// processing → failed
    pub fn fail(
        &mut self,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Result<(), InvalidTransition> {
        self.expect_status(StepStatus::Processing, StepStatus::Failed)?;
        self.status = StepStatus::Failed;
        self.error = Some(error.into());
        self.duration_ms = Some(duration_ms);
        self.advance_progress(100);
        Ok(())
    }

    /// pending → skipped
    pub fn skip(&mut self, reason: impl Into<String>) -> Result<(), InvalidTransition> {
        self.expect_status(StepStatus::Pending, StepStatus::Skipped)?;
        self.status = StepStatus::Skipped;
        self.skip_reason = Some(reason.into());
        self.advance_progress(100);
        Ok(())
    }

    /// Mark a non-terminal step failed after a run-level error or timeout
    ///
    /// Returns false (and changes nothing) when the step is already terminal.
    pub fn force_fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = StepStatus::Failed;
        self.error = Some(error.into());
        self.advance_progress(100);
        true
    }

    pub fn confidence(&self) -> Option<u8> {
        match self.status {
            StepStatus::Completed => self.result.as_ref().and_then(StepResult::confidence),
            _ => None,
        }
    }
}

/// Rounded mean of the confidences the steps reported; 0 when none did
pub fn aggregate_confidence(steps: &[ProcessingStep]) -> u8 {
    let reported: Vec<u32> = steps
        .iter()
        .filter_map(ProcessingStep::confidence)
        .map(u32::from)
        .collect();

    if reported.is_empty() {
        return 0;
    }

    let mean = reported.iter().sum::<u32>() as f64 / reported.len() as f64;
    mean.round().clamp(0.0, 100.0) as u8
}

/// One pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSession {
    pub session_id: Uuid,
    /// Enabled steps only, in execution order
    pub steps: Vec<ProcessingStep>,
    /// Aggregate 0-100 confidence
    pub confidence: u8,
    pub processing_time_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Caller's typed notes, carried through to the record unanalyzed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typed_notes: Option<String>,
    /// Run-level error (timeout or internal failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessingSession {
    pub fn new(started_at: DateTime<Utc>, plan: &[StepId]) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            steps: plan.iter().copied().map(ProcessingStep::new).collect(),
            confidence: 0,
            processing_time_ms: 0,
            started_at,
            completed_at: None,
            typed_notes: None,
            error: None,
        }
    }

    pub fn step(&self, id: StepId) -> Option<&ProcessingStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_mut(&mut self, id: StepId) -> Option<&mut ProcessingStep> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    fn completed_result(&self, id: StepId) -> Option<&StepResult> {
        self.step(id)
            .filter(|s| s.status == StepStatus::Completed)
            .and_then(|s| s.result.as_ref())
    }

    pub fn label(&self) -> Option<&LabelExtraction> {
        match self.completed_result(StepId::LabelExtraction) {
            Some(StepResult::Label(label)) => Some(label),
            _ => None,
        }
    }

    pub fn transcription(&self) -> Option<&Transcription> {
        match self.completed_result(StepId::SpeechTranscription) {
            Some(StepResult::Transcription(t)) => Some(t),
            _ => None,
        }
    }

    pub fn analysis(&self) -> Option<&WineAnalysis> {
        match self.completed_result(StepId::TextAnalysis) {
            Some(StepResult::Analysis(a)) => Some(a),
            _ => None,
        }
    }

    pub fn form_suggestion(&self) -> Option<&FormSuggestion> {
        match self.completed_result(StepId::FormSuggestion) {
            Some(StepResult::Form(form)) => Some(form),
            _ => None,
        }
    }

    pub fn all_terminal(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_terminal())
    }

    /// True when at least one step reported a confidence
    pub fn has_confidence(&self) -> bool {
        self.steps.iter().any(|s| s.confidence().is_some())
    }

    /// No run-level error and at least one step completed
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
            && self
                .steps
                .iter()
                .any(|s| s.status == StepStatus::Completed)
    }

    /// Seal the session: aggregate confidence and record timing
    pub fn finish(
        &mut self,
        error: Option<String>,
        processing_time_ms: u64,
        completed_at: DateTime<Utc>,
    ) {
        self.error = error;
        self.confidence = aggregate_confidence(&self.steps);
        self.processing_time_ms = processing_time_ms;
        self.completed_at = Some(completed_at);
    }
}
