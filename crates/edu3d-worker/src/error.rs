//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// The job payload itself is unusable; retrying cannot help.
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("AI request failed: {0}")]
    AiFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Workflow error: {0}")]
    Workflow(#[from] edu3d_models::WorkflowError),

    #[error("Media error: {0}")]
    Media(#[from] edu3d_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] edu3d_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob(msg.into())
    }

    pub fn ai_failed(msg: impl Into<String>) -> Self {
        Self::AiFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::AiFailed(_) | WorkerError::Queue(_) | WorkerError::Io(_) => true,
            WorkerError::Media(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Processes were killed because the worker is shutting down.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Media(edu3d_media::MediaError::Cancelled))
    }

    /// Failures that go straight to the dead letter queue.
    pub fn is_permanent_failure(&self) -> bool {
        matches!(
            self,
            WorkerError::InvalidJob(_) | WorkerError::Workflow(_) | WorkerError::ConfigError(_)
        )
    }
}
