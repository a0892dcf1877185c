//! Stage-by-stage progress of a conversion job.
//!
//! The pipeline reports once after every stage that completes, so a job
//! with `n` stages produces exactly `n` events with `current` running
//! from 1 to `n`.

/// One finished pipeline stage.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Job kind, `"convert"` for the FB2 pipeline.
    pub operation: String,
    /// Stages finished so far, including this one.
    pub current: u64,
    /// Stages scheduled for the job.
    pub total: Option<u64>,
    /// Name of the stage that just finished.
    pub message: Option<String>,
}

/// Receives pipeline progress; the CLI drives a terminal bar with it.
pub trait ProgressHandler: Send {
    fn on_progress(&self, event: ProgressEvent);
}

/// Report that `stage` finished as number `done` of `total`.
pub fn report_stage(handler: Option<&dyn ProgressHandler>, stage: &str, done: usize, total: usize) {
    let Some(h) = handler else {
        return;
    };
    h.on_progress(ProgressEvent {
        operation: "convert".to_string(),
        current: done as u64,
        total: Some(total as u64),
        message: Some(stage.to_string()),
    });
}
