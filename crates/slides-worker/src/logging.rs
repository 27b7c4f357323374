//! Structured job logging utilities.
//!
//! Provides consistent, structured logging for post-processing jobs with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};
use slides_models::{JobId, ProcessingPhase};

/// Job logger for structured logging with consistent formatting.
///
/// Every line carries the job ID and the session (task) it belongs to.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    task_id: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, task_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            task_id: task_id.to_string(),
        }
    }

    pub fn log_start(&self, files: usize) {
        info!(
            job_id = %self.job_id,
            task_id = %self.task_id,
            files,
            "Job started"
        );
    }

    /// Log entry into a phase.
    pub fn log_phase(&self, phase: ProcessingPhase, items: usize) {
        info!(
            job_id = %self.job_id,
            task_id = %self.task_id,
            phase = phase.as_str(),
            items,
            "Phase started"
        );
    }

    pub fn log_phase_skipped(&self, phase: ProcessingPhase) {
        info!(
            job_id = %self.job_id,
            task_id = %self.task_id,
            phase = phase.as_str(),
            "Phase disabled, skipping"
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            task_id = %self.task_id,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            task_id = %self.task_id,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            task_id = %self.task_id,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            task_id = %self.task_id,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Span to instrument the whole job with.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "post_process",
            job_id = %self.job_id,
            task_id = %self.task_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_carries_ids() {
        let job_id = JobId::from_string("pp_1_abc");
        let logger = JobLogger::new(&job_id, "task-7");

        assert_eq!(logger.job_id(), "pp_1_abc");
        assert_eq!(logger.task_id(), "task-7");
    }
}
