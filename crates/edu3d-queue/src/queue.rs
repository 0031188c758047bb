//! Job queue using Redis Streams, plus the job record store.

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use edu3d_models::{JobId, JobRecord, JobStatus, TransitionError, VideoJob, VideoRequest, VideoResult};

use crate::error::{QueueError, QueueResult};
use crate::job::{
    decode_entry, dedup_key, encode_fields, record_key, retry_key, Delivery, JOB_RECORD_TTL_SECS,
    RETRY_COUNTER_TTL_SECS,
};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Max retries before DLQ
    pub max_retries: u32,
    /// Idle time after which another worker may claim a pending job
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "edu3d:jobs".to_string(),
            consumer_group: "edu3d:workers".to_string(),
            dlq_stream_name: "edu3d:dlq".to_string(),
            max_retries: 3,
            // Running jobs are touched well within this; see `heartbeat_interval`.
            visibility_timeout: Duration::from_secs(2400),
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            visibility_timeout: std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.visibility_timeout),
        }
    }
}

/// A third of the visibility timeout, at least one second.
pub fn heartbeat_interval(visibility_timeout: Duration) -> Duration {
    (visibility_timeout / 3).max(Duration::from_secs(1))
}

/// Job queue client.
#[derive(Clone)]
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn conn(&self) -> QueueResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Round-trip to Redis, used by readiness checks.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Store a `queued` record for `request` and append it to the stream.
    ///
    /// Fails with [`QueueError::Duplicate`] while an identical request is queued or running.
    pub async fn enqueue(&self, request: VideoRequest) -> QueueResult<JobId> {
        let job = VideoJob::new(request);
        let mut conn = self.conn().await?;

        self.claim_dedup(&mut conn, &job).await?;

        let record = JobRecord::queued(&job);
        self.put_record(&mut conn, &record).await?;

        let mut xadd = redis::cmd("XADD");
        xadd.arg(&self.config.stream_name).arg("*");
        for (field, value) in encode_fields(&job)? {
            xadd.arg(field).arg(value);
        }
        let added: Result<String, redis::RedisError> = xadd.query_async(&mut conn).await;

        let message_id = match added {
            Ok(id) => id,
            Err(e) => {
                // Leave nothing behind that would block a resubmission.
                let _: Result<(), _> = conn.del(dedup_key(&job.request)).await;
                let _: Result<(), _> = conn.del(record_key(&job.job_id)).await;
                return Err(QueueError::enqueue_failed(e.to_string()));
            }
        };

        info!(
            job_id = %job.job_id,
            user_id = %job.request.user_id,
            "Enqueued job with message ID {}",
            message_id
        );

        Ok(job.job_id)
    }

    async fn claim_dedup(&self, conn: &mut MultiplexedConnection, job: &VideoJob) -> QueueResult<()> {
        let key = dedup_key(&job.request);
        let claimed: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(job.job_id.as_str())
            .arg("NX")
            .arg("EX")
            .arg(JOB_RECORD_TTL_SECS)
            .query_async(conn)
            .await?;
        if claimed.is_some() {
            return Ok(());
        }

        let holder: Option<String> = conn.get(&key).await?;
        if let Some(holder) = holder {
            let holder_id = JobId::from_string(holder);
            let active = self
                .get_record(conn, &holder_id)
                .await?
                .map(|r| !r.is_terminal())
                .unwrap_or(false);
            if active {
                warn!(job_id = %holder_id, "Duplicate job rejected");
                return Err(QueueError::Duplicate(holder_id.to_string()));
            }
        }

        // Previous holder finished or expired; take over.
        conn.set_ex::<_, _, ()>(&key, job.job_id.as_str(), JOB_RECORD_TTL_SECS)
            .await?;
        Ok(())
    }

    /// Release the duplicate-submission marker once `job_id` is terminal.
    pub async fn clear_dedup(&self, job_id: &JobId, request: &VideoRequest) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let key = dedup_key(request);
        let holder: Option<String> = conn.get(&key).await?;
        if holder.as_deref() == Some(job_id.as_str()) {
            conn.del::<_, ()>(&key).await?;
        }
        Ok(())
    }

    async fn get_record(
        &self,
        conn: &mut MultiplexedConnection,
        job_id: &JobId,
    ) -> QueueResult<Option<JobRecord>> {
        let raw: Option<String> = conn.get(record_key(job_id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put_record(&self, conn: &mut MultiplexedConnection, record: &JobRecord) -> QueueResult<()> {
        let json = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(record_key(&record.job_id), json, JOB_RECORD_TTL_SECS)
            .await?;
        Ok(())
    }

    /// Full job record, if it exists and has not expired.
    pub async fn record(&self, job_id: &JobId) -> QueueResult<Option<JobRecord>> {
        let mut conn = self.conn().await?;
        self.get_record(&mut conn, job_id).await
    }

    async fn require(&self, job_id: &JobId) -> QueueResult<JobRecord> {
        self.record(job_id)
            .await?
            .ok_or_else(|| QueueError::job_not_found(job_id.as_str()))
    }

    pub async fn status(&self, job_id: &JobId) -> QueueResult<JobStatus> {
        Ok(self.require(job_id).await?.status)
    }

    /// Result of a finished job; `None` while it is not finished.
    pub async fn result(&self, job_id: &JobId) -> QueueResult<Option<VideoResult>> {
        Ok(self.require(job_id).await?.result)
    }

    pub async fn progress(&self, job_id: &JobId) -> QueueResult<Option<u8>> {
        Ok(self.require(job_id).await?.progress)
    }

    /// Read-modify-write a record. The closure may reject illegal transitions.
    pub async fn update_record<F>(&self, job_id: &JobId, apply: F) -> QueueResult<JobRecord>
    where
        F: FnOnce(&mut JobRecord) -> Result<(), TransitionError>,
    {
        let mut conn = self.conn().await?;
        let mut record = self
            .get_record(&mut conn, job_id)
            .await?
            .ok_or_else(|| QueueError::job_not_found(job_id.as_str()))?;
        apply(&mut record)?;
        self.put_record(&mut conn, &record).await?;
        Ok(record)
    }

    /// Acknowledge a job and remove it from the stream.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;
        conn.del::<_, ()>(retry_key(message_id)).await?;

        debug!("Acknowledged job: {}", message_id);
        Ok(())
    }

    /// Move a job to the dead letter queue.
    pub async fn dlq(&self, message_id: &str, job: &VideoJob, error: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let payload = serde_json::to_string(job)?;
        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id).await?;

        warn!(job_id = %job.job_id, "Moved job to DLQ: {}", error);
        Ok(())
    }

    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    pub async fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Read new jobs for `consumer_name`, blocking up to `block_ms`.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;

        let reply: Option<redis::streams::StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();
        let Some(reply) = reply else {
            return Ok(jobs);
        };

        for stream_key in reply.keys {
            for entry in stream_key.ids {
                if let Some(delivery) = self.parse_delivery(entry.id, &entry.map).await {
                    debug!(job_id = %delivery.job.job_id, "Consumed job from stream");
                    jobs.push(delivery);
                }
            }
        }

        Ok(jobs)
    }

    /// Claim jobs left pending by crashed workers for longer than the visibility timeout.
    pub async fn claim_pending(&self, consumer_name: &str, count: usize) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;
        let min_idle_ms = self.config.visibility_timeout.as_millis() as u64;

        let pending: redis::streams::StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut xclaim = redis::cmd("XCLAIM");
        xclaim
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms);
        for pending_id in &pending.ids {
            xclaim.arg(&pending_id.id);
        }
        let claimed: redis::streams::StreamClaimReply = xclaim.query_async(&mut conn).await?;

        let mut jobs = Vec::new();
        for entry in claimed.ids {
            if let Some(delivery) = self.parse_delivery(entry.id, &entry.map).await {
                info!(job_id = %delivery.job.job_id, "Claimed pending job from stream");
                jobs.push(delivery);
            }
        }

        Ok(jobs)
    }

    /// Reset the idle time of `message_id` so `claim_pending` leaves it alone.
    ///
    /// Called periodically by the consumer that owns the entry while its job runs.
    pub async fn touch(&self, consumer_name: &str, message_id: &str) -> QueueResult<bool> {
        let mut conn = self.conn().await?;

        let claimed: Vec<String> = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(0)
            .arg(message_id)
            .arg("JUSTID")
            .query_async(&mut conn)
            .await?;

        Ok(!claimed.is_empty())
    }

    /// How often an owning consumer should call [`JobQueue::touch`].
    pub fn heartbeat_interval(&self) -> Duration {
        heartbeat_interval(self.config.visibility_timeout)
    }

    async fn parse_delivery(
        &self,
        message_id: String,
        map: &std::collections::HashMap<String, redis::Value>,
    ) -> Option<Delivery> {
        match decode_entry(map) {
            Some(Ok(job)) => Some(Delivery { message_id, job }),
            Some(Err(e)) => {
                warn!("Failed to parse job payload: {}", e);
                // Ack the malformed message to prevent reprocessing
                self.ack(&message_id).await.ok();
                None
            }
            None => {
                warn!("Stream entry {} has no job payload", message_id);
                self.ack(&message_id).await.ok();
                None
            }
        }
    }

    pub async fn get_retry_count(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.conn().await?;
        let count: Option<u32> = conn.get(retry_key(message_id)).await?;
        Ok(count.unwrap_or(0))
    }

    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.conn().await?;
        let key = retry_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, RETRY_COUNTER_TTL_SECS).await?;
        Ok(count)
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.stream_name, "edu3d:jobs");
        assert_eq!(config.max_retries, 3);
        assert!(config.visibility_timeout > Duration::from_secs(1800));
    }

    #[test]
    fn test_heartbeat_interval_stays_inside_visibility_timeout() {
        assert_eq!(heartbeat_interval(Duration::from_secs(2400)), Duration::from_secs(800));
        assert_eq!(heartbeat_interval(Duration::from_secs(1)), Duration::from_secs(1));
        assert!(heartbeat_interval(Duration::from_secs(90)) < Duration::from_secs(90));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let config = QueueConfig {
            redis_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(JobQueue::new(config).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_connection_error() {
        let queue = JobQueue::new(QueueConfig {
            redis_url: "redis://127.0.0.1:1".to_string(),
            ..Default::default()
        })
        .unwrap();
        let err = queue.ping().await.unwrap_err();
        assert!(matches!(err, QueueError::ConnectionFailed(_)));
    }
}
