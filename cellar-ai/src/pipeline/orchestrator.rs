//! Pipeline orchestrator
//!
//! Runs the enabled steps of one session strictly in order:
//! label extraction → speech transcription → text analysis → form suggestion.
//!
//! - A step whose input is missing is skipped, not failed.
//! - A failing step never stops later steps (error isolation).
//! - The whole run shares one deadline. When it passes, the running step
//!   and every step not yet started are marked failed and the session is
//!   returned with a run-level error.
//! - A panic inside a step is caught at the run boundary and handled like a
//!   run-level error.
//!
//! Every state change is reported to the progress callback as a full
//! snapshot of the steps.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use cellar_common::Clock;

use crate::models::{
    AiProcessingInput, AiProcessingOptions, InvalidTransition, LabelExtraction,
    ProcessingSession, ProcessingStep, StepId, StepResult, Transcription, WineAnalysis,
};
use crate::pipeline::form_suggestion::suggest_form;
use crate::pipeline::PipelineError;
use crate::providers::{AdapterOutcome, AdapterResult, LanguageAdapter, VisionAdapter};
use crate::services::{CacheStore, SessionLog};

/// Orchestrator-level settings
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub session_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_millis(60_000),
        }
    }
}

/// How one step execution ended
enum StepOutcome {
    Completed {
        result: Option<StepResult>,
        from_cache: bool,
    },
    Failed(String),
}

impl StepOutcome {
    fn from_adapter<T>(outcome: AdapterOutcome<T>, wrap: fn(T) -> StepResult) -> Self {
        let from_cache = outcome.from_cache;
        match outcome.result {
            AdapterResult::Success(value) => StepOutcome::Completed {
                result: Some(wrap(value)),
                from_cache,
            },
            AdapterResult::Empty => StepOutcome::Completed {
                result: None,
                from_cache,
            },
            AdapterResult::Failed(err) => StepOutcome::Failed(err.to_string()),
        }
    }
}

/// Results produced so far, feeding later steps
#[derive(Default)]
struct StepContext {
    label: Option<LabelExtraction>,
    transcription: Option<Transcription>,
    analysis: Option<WineAnalysis>,
}

impl StepContext {
    fn absorb(&mut self, result: &StepResult) {
        match result {
            StepResult::Label(label) => self.label = Some(label.clone()),
            StepResult::Transcription(t) => self.transcription = Some(t.clone()),
            StepResult::Analysis(a) => self.analysis = Some(a.clone()),
            StepResult::Form(_) => {}
        }
    }

    /// Text fed to analysis: transcript, then label text
    fn analysis_text(&self) -> Option<String> {
        let parts: Vec<&str> = [
            self.transcription.as_ref().map(|t| t.text.as_str()),
            self.label.as_ref().map(|l| l.raw_text.as_str()),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }
}

pub struct PipelineOrchestrator {
    vision: VisionAdapter,
    language: LanguageAdapter,
    cache: CacheStore,
    session_log: SessionLog,
    config: PipelineConfig,
    clock: Arc<dyn Clock>,
}

impl PipelineOrchestrator {
    pub fn new(
        vision: VisionAdapter,
        language: LanguageAdapter,
        cache: CacheStore,
        session_log: SessionLog,
        config: PipelineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            vision,
            language,
            cache,
            session_log,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one session to completion
    ///
    /// Returns `Err` only when no step is enabled; every other problem is
    /// recorded in the returned session.
    pub async fn run<F>(
        &self,
        input: &AiProcessingInput,
        options: &AiProcessingOptions,
        mut on_progress: F,
    ) -> Result<ProcessingSession, PipelineError>
    where
        F: FnMut(Vec<ProcessingStep>) + Send,
    {
        let plan = options.enabled_steps();
        if plan.is_empty() {
            return Err(PipelineError::NoStepsEnabled);
        }

        let started = Instant::now();
        let timeout = options
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.session_timeout);
        let deadline = started + timeout;

        let mut session = ProcessingSession::new(self.clock.now(), &plan);
        session.typed_notes = input.free_text().map(str::to_string);
        let session_id = session.session_id;
        info!(
            session_id = %session_id,
            steps = ?plan,
            timeout_ms = timeout.as_millis() as u64,
            "Starting AI processing session"
        );

        let mut context = StepContext::default();
        let mut run_error: Option<String> = None;

        for index in 0..session.steps.len() {
            let step_id = session.steps[index].id;

            if Instant::now() >= deadline {
                run_error = Some(timeout_message(timeout));
                break;
            }

            if let Some(reason) = self.skip_reason(step_id, input, &context) {
                debug!(session_id = %session_id, step = %step_id, reason, "Skipping step");
                checked(session_id, session.steps[index].skip(reason));
                on_progress(session.steps.clone());
                continue;
            }

            checked(session_id, session.steps[index].start());
            on_progress(session.steps.clone());

            let step_started = Instant::now();
            let execution = AssertUnwindSafe(self.execute_step(step_id, input, options, &context))
                .catch_unwind();

            let finished = tokio::time::timeout_at(deadline, execution).await;
            match finished {
                Ok(Ok(StepOutcome::Completed { result, from_cache })) => {
                    let duration_ms = elapsed_ms(step_started);
                    if let Some(result) = &result {
                        context.absorb(result);
                    }
                    debug!(
                        session_id = %session_id,
                        step = %step_id,
                        duration_ms,
                        from_cache,
                        empty = result.is_none(),
                        "Step completed"
                    );
                    checked(
                        session_id,
                        session.steps[index].complete(result, duration_ms, from_cache),
                    );
                }
                Ok(Ok(StepOutcome::Failed(error))) => {
                    warn!(session_id = %session_id, step = %step_id, error = %error, "Step failed");
                    checked(session_id, session.steps[index].fail(error, elapsed_ms(step_started)));
                }
                Ok(Err(panic)) => {
                    let message =
                        format!("Internal error in {}: {}", step_id, panic_message(panic.as_ref()));
                    warn!(
                        session_id = %session_id,
                        step = %step_id,
                        error = %message,
                        "Step panicked"
                    );
                    checked(
                        session_id,
                        session.steps[index].fail(message.clone(), elapsed_ms(step_started)),
                    );
                    run_error = Some(message);
                    on_progress(session.steps.clone());
                    break;
                }
                Err(_) => {
                    let message = timeout_message(timeout);
                    warn!(
                        session_id = %session_id,
                        step = %step_id,
                        "Step interrupted by session timeout"
                    );
                    checked(
                        session_id,
                        session.steps[index].fail(message.clone(), elapsed_ms(step_started)),
                    );
                    run_error = Some(message);
                    on_progress(session.steps.clone());
                    break;
                }
            }

            on_progress(session.steps.clone());
        }

        if !session.all_terminal() {
            let message = run_error
                .clone()
                .unwrap_or_else(|| "Processing interrupted".to_string());
            for step in session.steps.iter_mut() {
                step.force_fail(message.clone());
            }
            on_progress(session.steps.clone());
        }

        session.finish(run_error, elapsed_ms(started), self.clock.now());

        if options.use_cache {
            self.cache
                .set(&CacheStore::session_key(session_id), &session)
                .await;
        }
        self.session_log.record(&session).await;

        info!(
            session_id = %session_id,
            confidence = session.confidence,
            processing_time_ms = session.processing_time_ms,
            error = ?session.error,
            "AI processing session finished"
        );

        Ok(session)
    }

    /// Why a step cannot run with the inputs gathered so far
    fn skip_reason(
        &self,
        step: StepId,
        input: &AiProcessingInput,
        context: &StepContext,
    ) -> Option<&'static str> {
        match step {
            StepId::LabelExtraction if input.image().is_none() => Some("No label image provided"),
            StepId::SpeechTranscription if input.audio().is_none() => {
                Some("No audio recording provided")
            }
            StepId::TextAnalysis if context.analysis_text().is_none() => {
                Some("No text available for analysis")
            }
            _ => None,
        }
    }

    async fn execute_step(
        &self,
        step: StepId,
        input: &AiProcessingInput,
        options: &AiProcessingOptions,
        context: &StepContext,
    ) -> StepOutcome {
        match step {
            StepId::LabelExtraction => match input.image() {
                Some(image) => StepOutcome::from_adapter(
                    self.vision
                        .extract_label(image, input.hints(), options)
                        .await,
                    StepResult::Label,
                ),
                None => StepOutcome::Failed("No label image provided".to_string()),
            },
            StepId::SpeechTranscription => match input.audio() {
                Some(audio) => StepOutcome::from_adapter(
                    self.language.transcribe(audio, options).await,
                    StepResult::Transcription,
                ),
                None => StepOutcome::Failed("No audio recording provided".to_string()),
            },
            StepId::TextAnalysis => match context.analysis_text() {
                Some(text) => StepOutcome::from_adapter(
                    self.language.analyze(&text, input.hints(), options).await,
                    StepResult::Analysis,
                ),
                None => StepOutcome::Failed("No text available for analysis".to_string()),
            },
            StepId::FormSuggestion => match suggest_form(
                context.label.as_ref(),
                context.analysis.as_ref(),
                input.hints(),
            ) {
                Ok(form) => StepOutcome::Completed {
                    result: Some(StepResult::Form(form)),
                    from_cache: false,
                },
                Err(e) => StepOutcome::Failed(e.to_string()),
            },
        }
    }
}

fn timeout_message(timeout: Duration) -> String {
    format!("Session timed out after {} ms", timeout.as_millis())
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Step transitions here follow the lifecycle by construction; a rejected
/// one indicates a bug and is logged rather than aborting the run.
fn checked(session_id: Uuid, transition: Result<(), InvalidTransition>) {
    if let Err(e) = transition {
        error!(session_id = %session_id, error = %e, "Rejected step transition");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MediaRef, WineDetails};

    fn transcription(text: &str) -> Transcription {
        Transcription {
            text: text.to_string(),
            language: None,
            duration_secs: None,
            confidence: 80,
        }
    }

    #[test]
    fn test_analysis_text_is_transcript_then_label() {
        let mut context = StepContext::default();
        context.absorb(&StepResult::Label(LabelExtraction {
            raw_text: "LABEL".to_string(),
            wine: WineDetails::default(),
            confidence: 60,
        }));
        context.absorb(&StepResult::Transcription(transcription("SPOKEN")));
        assert_eq!(context.analysis_text().as_deref(), Some("SPOKEN\n\nLABEL"));

        let mut blank = StepContext::default();
        assert_eq!(blank.analysis_text(), None);
        blank.absorb(&StepResult::Transcription(transcription("  ")));
        assert_eq!(blank.analysis_text(), None);
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[test]
    fn test_input_accessors_used_for_skips() {
        let input = AiProcessingInput {
            image: Some(MediaRef::new("/tmp/label.jpg")),
            ..AiProcessingInput::default()
        };
        assert!(input.image().is_some());
        assert!(input.audio().is_none());
    }
}
