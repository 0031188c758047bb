//! Progress events via Redis Pub/Sub.

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::debug;

use edu3d_models::{JobId, JobStatus};

use crate::error::QueueResult;
use crate::job::progress_channel;

/// Pipeline milestones and the percentage reported for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    Analyzing,
    Designing,
    Rendering,
    Encoding,
    Finished,
}

impl Milestone {
    pub fn percent(&self) -> u8 {
        match self {
            Milestone::Analyzing => 10,
            Milestone::Designing => 30,
            Milestone::Rendering => 50,
            Milestone::Encoding => 80,
            Milestone::Finished => 100,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Milestone::Analyzing => "Analyzing topic",
            Milestone::Designing => "Designing 3D scene",
            Milestone::Rendering => "Rendering",
            Milestone::Encoding => "Encoding video",
            Milestone::Finished => "Complete",
        }
    }
}

/// Progress event published to Redis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn milestone(job_id: &JobId, milestone: Milestone) -> Self {
        let status = if milestone == Milestone::Finished {
            JobStatus::Finished
        } else {
            JobStatus::Running
        };
        Self {
            job_id: job_id.clone(),
            status,
            progress: Some(milestone.percent()),
            step: Some(milestone.label().to_string()),
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(job_id: &JobId, error: impl Into<String>) -> Self {
        Self {
            job_id: job_id.clone(),
            status: JobStatus::Failed,
            progress: None,
            step: None,
            message: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn log(job_id: &JobId, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.clone(),
            status: JobStatus::Running,
            progress: None,
            step: None,
            message: Some(message.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Channel for publishing/subscribing to progress events.
#[derive(Clone)]
pub struct ProgressChannel {
    client: redis::Client,
}

impl ProgressChannel {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub async fn publish(&self, event: &ProgressEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = progress_channel(&event.job_id);
        let payload = serde_json::to_string(event)?;

        debug!("Publishing progress event to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;

        Ok(())
    }

    pub async fn milestone(&self, job_id: &JobId, milestone: Milestone) -> QueueResult<()> {
        self.publish(&ProgressEvent::milestone(job_id, milestone)).await
    }

    pub async fn log(&self, job_id: &JobId, message: impl Into<String>) -> QueueResult<()> {
        self.publish(&ProgressEvent::log(job_id, message)).await
    }

    pub async fn error(&self, job_id: &JobId, message: impl Into<String>) -> QueueResult<()> {
        self.publish(&ProgressEvent::failed(job_id, message)).await
    }

    /// Subscribe to progress events for a job.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = ProgressEvent> + Send>>> {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(progress_channel(job_id)).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_milestones_are_increasing() {
        let all = [
            Milestone::Analyzing,
            Milestone::Designing,
            Milestone::Rendering,
            Milestone::Encoding,
            Milestone::Finished,
        ];
        let percents: Vec<u8> = all.iter().map(Milestone::percent).collect();
        assert_eq!(percents, vec![10, 30, 50, 80, 100]);
    }

    #[test]
    fn test_event_serialization() {
        let id = JobId::from_string("job-1");
        let event = ProgressEvent::milestone(&id, Milestone::Rendering);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["job_id"], "job-1");
        assert_eq!(json["status"], "running");
        assert_eq!(json["progress"], 50);
        assert!(json.get("message").is_none());

        let done = ProgressEvent::milestone(&id, Milestone::Finished);
        assert_eq!(done.status, JobStatus::Finished);

        let failed = ProgressEvent::failed(&id, "boom");
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.message.as_deref(), Some("boom"));
    }
}
