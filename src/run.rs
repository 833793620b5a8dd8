//! Per-run context: unique run id, isolated scratch directory, phase
//! tracking, and the degradation log.
//!
//! ## Why a context object?
//!
//! Every working file a run produces (rasterised pages, normalized copies,
//! MICR crops) lives under one scratch directory owned by exactly one
//! [`RunContext`]. Concurrent requests therefore cannot collide on file
//! names, and cleanup is the context's `Drop` — there is no shared working
//! directory and no fixed naming scheme to race on.

use crate::config::ExtractionConfig;
use crate::error::{Degradation, ExtractError, StepError};
use std::fmt;
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Phases of one extraction run.
///
/// `Failed` is reachable from any non-terminal phase; `Done` and `Failed`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelinePhase {
    Received,
    DirectTextAttempted,
    /// Embedded text met the threshold; OCR is skipped.
    Sufficient,
    /// Embedded text was absent or too short; OCR must run.
    OcrRequired,
    OcrRunning,
    FieldsSynthesized,
    Persisted,
    Done,
    Failed,
}

impl PipelinePhase {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: PipelinePhase) -> bool {
        use PipelinePhase::*;
        if matches!(self, Done | Failed) {
            return false;
        }
        if next == Failed {
            return true;
        }
        matches!(
            (self, next),
            (Received, DirectTextAttempted)
                | (DirectTextAttempted, Sufficient)
                | (DirectTextAttempted, OcrRequired)
                | (Sufficient, FieldsSynthesized)
                | (OcrRequired, OcrRunning)
                | (OcrRunning, FieldsSynthesized)
                | (FieldsSynthesized, Persisted)
                | (FieldsSynthesized, Done)
                | (Persisted, Done)
        )
    }

    /// Emit the transition at DEBUG, keyed by run id.
    ///
    /// Public because the persistence phases happen outside the orchestrator:
    /// the API/CLI layer logs `Persisted`/`Done` after the store write.
    pub fn log(self, run_id: &str) {
        debug!(run_id = %run_id, phase = %self, "pipeline phase");
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelinePhase::Received => "RECEIVED",
            PipelinePhase::DirectTextAttempted => "DIRECT_TEXT_ATTEMPTED",
            PipelinePhase::Sufficient => "SUFFICIENT",
            PipelinePhase::OcrRequired => "OCR_REQUIRED",
            PipelinePhase::OcrRunning => "OCR_RUNNING",
            PipelinePhase::FieldsSynthesized => "FIELDS_SYNTHESIZED",
            PipelinePhase::Persisted => "PERSISTED",
            PipelinePhase::Done => "DONE",
            PipelinePhase::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// State owned by exactly one extraction run.
pub struct RunContext {
    run_id: String,
    /// `None` only after `Drop` has decided to keep the directory.
    scratch: Option<TempDir>,
    keep_artifacts: bool,
    phase: PipelinePhase,
    degradations: Vec<Degradation>,
}

impl RunContext {
    /// Create a fresh context with its own scratch directory.
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let scratch = tempfile::Builder::new()
            .prefix("bankscan-")
            .tempdir()
            .map_err(|source| ExtractError::Scratch { source })?;
        let run_id = Uuid::new_v4().to_string();
        debug!(
            run_id = %run_id,
            scratch = %scratch.path().display(),
            "run context created"
        );
        Ok(Self {
            run_id,
            scratch: Some(scratch),
            keep_artifacts: config.keep_artifacts,
            phase: PipelinePhase::Received,
            degradations: Vec::new(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Directory all of this run's intermediate files are written to.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch
            .as_ref()
            .expect("scratch dir taken before drop")
            .path()
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    /// Move to the next phase, logging the transition.
    ///
    /// Illegal transitions are a pipeline bug, not an input condition, so
    /// they only trip a debug assertion.
    pub fn advance(&mut self, next: PipelinePhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal phase transition {} -> {}",
            self.phase,
            next
        );
        self.phase = next;
        next.log(&self.run_id);
    }

    /// Record a recovered step failure and keep going.
    pub fn degrade(&mut self, stage: &str, error: StepError) {
        warn!(run_id = %self.run_id, stage = stage, error = %error, "step degraded");
        self.degradations.push(Degradation::new(stage, error));
    }

    pub fn degradations(&self) -> &[Degradation] {
        &self.degradations
    }

    /// Hand the degradation log to the output.
    pub fn take_degradations(&mut self) -> Vec<Degradation> {
        std::mem::take(&mut self.degradations)
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        if self.keep_artifacts {
            if let Some(dir) = self.scratch.take() {
                let path = dir.keep();
                info!(
                    run_id = %self.run_id,
                    path = %path.display(),
                    "scratch directory kept"
                );
            }
        }
        // Otherwise TempDir removes the directory on drop.
    }
}
