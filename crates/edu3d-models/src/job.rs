//! Job identifiers, queue payloads and the persisted job record.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::{GenerationMethod, TopicAnalysis, VideoRequest};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker
    #[default]
    Queued,
    /// Picked up by a worker
    Running,
    /// Video produced (possibly a fallback)
    Finished,
    /// Gave up
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Finished)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected state change on a [`JobRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid job transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Output of a finished job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoResult {
    /// Path of the produced file (MP4, or an HTML preview without FFmpeg)
    pub video_path: String,
    /// Method that actually produced the file; the requested one when `fallback` is set
    pub method_used: GenerationMethod,
    /// True when the placeholder/preview path was taken
    #[serde(default)]
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<TopicAnalysis>,
}

/// Message appended to the job stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoJob {
    pub job_id: JobId,
    pub request: VideoRequest,
    pub enqueued_at: DateTime<Utc>,
}

impl VideoJob {
    pub fn new(request: VideoRequest) -> Self {
        Self {
            job_id: JobId::new(),
            request,
            enqueued_at: Utc::now(),
        }
    }
}

/// Persisted state of a job, as returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobRecord {
    pub job_id: JobId,
    pub request: VideoRequest,
    pub status: JobStatus,
    /// Progress percentage (0-100)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<VideoResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Fresh `queued` record for a job about to be enqueued.
    pub fn queued(job: &VideoJob) -> Self {
        Self {
            job_id: job.job_id.clone(),
            request: job.request.clone(),
            status: JobStatus::Queued,
            progress: None,
            current_step: None,
            result: None,
            error: None,
            created_at: job.enqueued_at,
            updated_at: job.enqueued_at,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        match next {
            JobStatus::Running => self.started_at = Some(now),
            JobStatus::Finished | JobStatus::Failed => self.finished_at = Some(now),
            JobStatus::Queued => {}
        }
        Ok(())
    }

    /// Mark the job as picked up by a worker.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Running)?;
        self.progress = Some(0);
        Ok(())
    }

    /// Update progress; values above 100 are clamped. Ignored once terminal.
    pub fn set_progress(&mut self, progress: u8, step: Option<&str>) {
        if self.is_terminal() {
            return;
        }
        self.progress = Some(progress.min(100));
        if let Some(step) = step {
            self.current_step = Some(step.to_string());
        }
        self.updated_at = Utc::now();
    }

    pub fn finish(&mut self, result: VideoResult) -> Result<(), TransitionError> {
        self.transition(JobStatus::Finished)?;
        self.progress = Some(100);
        self.current_step = Some("Complete".into());
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Level, Subject};

    fn record() -> JobRecord {
        let req = VideoRequest::new("Newton's laws", Subject::Physics, Level::HighSchool, "user-1");
        JobRecord::queued(&VideoJob::new(req))
    }

    fn result() -> VideoResult {
        VideoResult {
            video_path: "/tmp/out/final_video.mp4".into(),
            method_used: GenerationMethod::Blender,
            fallback: false,
            analysis: None,
        }
    }

    #[test]
    fn test_happy_path() {
        let mut rec = record();
        assert_eq!(rec.status, JobStatus::Queued);
        assert!(rec.progress.is_none());

        rec.start().unwrap();
        assert_eq!(rec.status, JobStatus::Running);
        assert!(rec.started_at.is_some());

        rec.set_progress(50, Some("Rendering"));
        assert_eq!(rec.progress, Some(50));
        assert_eq!(rec.current_step.as_deref(), Some("Rendering"));

        rec.finish(result()).unwrap();
        assert_eq!(rec.status, JobStatus::Finished);
        assert_eq!(rec.progress, Some(100));
        assert!(rec.finished_at.is_some());
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut rec = record();
        rec.start().unwrap();
        rec.set_progress(250, None);
        assert_eq!(rec.progress, Some(100));
    }

    #[test]
    fn test_queued_can_fail() {
        let mut rec = record();
        rec.fail("dead-lettered").unwrap();
        assert_eq!(rec.status, JobStatus::Failed);
        assert_eq!(rec.error.as_deref(), Some("dead-lettered"));
    }

    #[test]
    fn test_terminal_states_are_immutable() {
        let mut rec = record();
        rec.start().unwrap();
        rec.finish(result()).unwrap();

        let err = rec.fail("late").unwrap_err();
        assert_eq!(err.from, JobStatus::Finished);
        assert_eq!(err.to, JobStatus::Failed);
        assert!(rec.start().is_err());

        rec.set_progress(10, Some("ignored"));
        assert_eq!(rec.progress, Some(100));
        assert_eq!(rec.status, JobStatus::Finished);
    }

    #[test]
    fn test_cannot_finish_without_starting() {
        let mut rec = record();
        assert!(rec.finish(result()).is_err());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&JobStatus::Running).unwrap(), "\"running\"");
        let rec = record();
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["status"], "queued");
        assert!(json.get("progress").is_none());
    }
}
