//! Structured job logging utilities.

use tracing::{error, info, warn, Span};

use edu3d_models::{JobId, VideoRequest};
use edu3d_queue::Milestone;

/// Logs job lifecycle events with the job id, user and method attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    user_id: String,
    method: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, request: &VideoRequest) -> Self {
        Self {
            job_id: job_id.to_string(),
            user_id: request.user_id.clone(),
            method: request.method.as_str(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn log_start(&self, topic: &str) {
        info!(
            job_id = %self.job_id,
            user_id = %self.user_id,
            method = self.method,
            "Job started: {}", topic
        );
    }

    pub fn log_stage(&self, milestone: Milestone) {
        info!(
            job_id = %self.job_id,
            progress = milestone.percent(),
            "Job stage: {}", milestone.label()
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, method = self.method, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, method = self.method, "Job error: {}", message);
    }

    pub fn log_completion(&self, video_path: &str, fallback: bool) {
        info!(
            job_id = %self.job_id,
            user_id = %self.user_id,
            fallback,
            "Job completed: {}", video_path
        );
    }

    /// Span wrapping the whole job execution.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, method = self.method)
    }
}
