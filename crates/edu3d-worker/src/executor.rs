//! Job executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use edu3d_models::{JobStatus, VideoJob};
use edu3d_queue::{Delivery, JobQueue, Milestone, ProgressChannel};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::pipeline::VideoPipeline;
use crate::retry::FailureTracker;

/// Shared state of in-flight jobs.
struct JobContext {
    queue: JobQueue,
    consumer_name: String,
    progress: ProgressChannel,
    pipeline: VideoPipeline,
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    ctx: Arc<JobContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    /// Kills running Blender/FFmpeg processes once the shutdown grace period is over
    cancel: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, queue: JobQueue) -> WorkerResult<Self> {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_videos));
        let (shutdown, _) = watch::channel(false);
        let (cancel, cancel_rx) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        let progress = ProgressChannel::new(&queue.config().redis_url)?;
        let pipeline = VideoPipeline::new(config.clone()).with_cancel(cancel_rx);

        Ok(Self {
            config,
            ctx: Arc::new(JobContext {
                queue,
                consumer_name: consumer_name.clone(),
                progress,
                pipeline,
            }),
            job_semaphore,
            shutdown,
            cancel,
            consumer_name,
        })
    }

    /// Start the executor. Returns once shutdown was signalled and in-flight jobs drained.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent videos",
            self.consumer_name, self.config.max_concurrent_videos
        );

        self.ctx.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_task = self.spawn_claim_task();

        // Main job consumption loop
        let mut failures = FailureTracker::new(3);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    match result {
                        Ok(()) => failures.record_success(),
                        Err(e) => {
                            if failures.record_failure() {
                                error!("Error consuming jobs: {}", e);
                            }
                            // Back off on error
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs did not finish within {:?}, cancelling; they will be reclaimed by another worker",
                self.config.shutdown_timeout
            );
            let _ = self.cancel.send(true);
            let _ = tokio::time::timeout(Duration::from_secs(10), self.wait_for_jobs()).await;
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Periodically claim jobs abandoned by crashed workers.
    fn spawn_claim_task(&self) -> tokio::task::JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let claim_interval = self.config.claim_interval;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            let mut failures = FailureTracker::new(3);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let available = semaphore.available_permits();
                        if available == 0 {
                            continue;
                        }
                        match ctx.queue.claim_pending(&consumer_name, available).await {
                            Ok(jobs) => {
                                failures.record_success();
                                if !jobs.is_empty() {
                                    info!("Claimed {} pending jobs", jobs.len());
                                }
                                for delivery in jobs {
                                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                        break;
                                    };
                                    let ctx = Arc::clone(&ctx);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        execute_job(ctx, delivery).await;
                                    });
                                }
                            }
                            Err(e) => {
                                if failures.record_failure() {
                                    warn!("Failed to claim pending jobs: {}", e);
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    /// Consume and process jobs from the queue.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .ctx
            .queue
            .consume(&self.consumer_name, 1000, available)
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for delivery in jobs {
            let ctx = Arc::clone(&self.ctx);
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                execute_job(ctx, delivery).await;
            });
        }

        Ok(())
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.config.max_concurrent_videos {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// What to do with a delivery given its stored record.
#[derive(Debug, PartialEq, Eq)]
enum Admission {
    /// Already finished or failed; drop the message.
    Skip,
    /// Queued; move to running first.
    Start,
    /// Running from an earlier attempt.
    Resume,
}

fn admission_for(status: JobStatus) -> Admission {
    match status {
        JobStatus::Queued => Admission::Start,
        JobStatus::Running => Admission::Resume,
        JobStatus::Finished | JobStatus::Failed => Admission::Skip,
    }
}

/// Execute a single job with retry and DLQ handling.
async fn execute_job(ctx: Arc<JobContext>, delivery: Delivery) {
    let logger = JobLogger::new(&delivery.job.job_id, &delivery.job.request);
    let span = logger.create_span();
    run_job(ctx, delivery, logger).instrument(span).await
}

async fn run_job(ctx: Arc<JobContext>, delivery: Delivery, logger: JobLogger) {
    let Delivery { message_id, job } = delivery;
    let job_id = job.job_id.clone();
    let started = Instant::now();

    let admission = match ctx.queue.record(&job_id).await {
        Ok(Some(record)) => admission_for(record.status),
        Ok(None) => {
            let err = WorkerError::invalid_job("Job record is missing or expired");
            handle_failure(&ctx, &message_id, &job, err, &logger, started).await;
            return;
        }
        Err(e) => {
            handle_failure(&ctx, &message_id, &job, e.into(), &logger, started).await;
            return;
        }
    };

    match admission {
        Admission::Skip => {
            info!("Job already terminal, dropping redelivered message");
            if let Err(e) = ctx.queue.ack(&message_id).await {
                error!("Failed to ack job {}: {}", job_id, e);
            }
            return;
        }
        Admission::Start => {
            if let Err(e) = ctx.queue.update_record(&job_id, |r| r.start()).await {
                handle_failure(&ctx, &message_id, &job, e.into(), &logger, started).await;
                return;
            }
        }
        Admission::Resume => info!("Resuming job from an earlier attempt"),
    }

    logger.log_start(&job.request.topic);

    let (tx, rx) = mpsc::unbounded_channel();
    let drain = tokio::spawn(forward_milestones(
        ctx.queue.clone(),
        ctx.progress.clone(),
        job.clone(),
        logger.clone(),
        rx,
    ));
    let heartbeat = spawn_heartbeat(
        ctx.queue.clone(),
        ctx.consumer_name.clone(),
        message_id.clone(),
    );
    let result = ctx.pipeline.generate(&job_id, &job.request, tx).await;
    heartbeat.abort();
    // Sender dropped with `generate`; the drain ends once it has flushed.
    drain.await.ok();

    match result {
        Ok(video) => {
            let fallback = video.fallback;
            let video_path = video.video_path.clone();

            if let Err(e) = ctx.queue.update_record(&job_id, |r| r.finish(video)).await {
                error!("Failed to store result for job {}: {}", job_id, e);
            }
            ctx.progress.milestone(&job_id, Milestone::Finished).await.ok();
            if let Err(e) = ctx.queue.ack(&message_id).await {
                error!("Failed to ack job {}: {}", job_id, e);
            }
            if let Err(e) = ctx.queue.clear_dedup(&job_id, &job.request).await {
                warn!("Failed to clear dedup key for job {}: {}", job_id, e);
            }

            if fallback {
                metrics::record_fallback(job.request.method.as_str());
            }
            metrics::record_job("finished", started.elapsed().as_secs_f64());
            logger.log_completion(&video_path, fallback);
        }
        Err(e) => handle_failure(&ctx, &message_id, &job, e, &logger, started).await,
    }
}

/// Keep the stream entry owned by this consumer while its job runs.
fn spawn_heartbeat(
    queue: JobQueue,
    consumer_name: String,
    message_id: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = queue.heartbeat_interval();
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;
            match queue.touch(&consumer_name, &message_id).await {
                Ok(true) => debug!("Heartbeat for message {}", message_id),
                Ok(false) => {
                    warn!("Message {} is no longer pending, stopping heartbeat", message_id);
                    break;
                }
                Err(e) => warn!("Heartbeat for message {} failed: {}", message_id, e),
            }
        }
    })
}

/// Publish pipeline milestones and mirror them into the job record.
async fn forward_milestones(
    queue: JobQueue,
    progress: ProgressChannel,
    job: VideoJob,
    logger: JobLogger,
    mut rx: mpsc::UnboundedReceiver<Milestone>,
) {
    while let Some(milestone) = rx.recv().await {
        logger.log_stage(milestone);
        let update = queue
            .update_record(&job.job_id, |r| {
                r.set_progress(milestone.percent(), Some(milestone.label()));
                Ok(())
            })
            .await;
        if let Err(e) = update {
            warn!("Failed to update progress: {}", e);
        }
        progress.milestone(&job.job_id, milestone).await.ok();
    }
}

async fn handle_failure(
    ctx: &JobContext,
    message_id: &str,
    job: &VideoJob,
    err: WorkerError,
    logger: &JobLogger,
    started: Instant,
) {
    if err.is_cancelled() {
        // Left pending so another worker claims it after the visibility timeout.
        logger.log_warning("Job cancelled by shutdown");
        metrics::record_job("cancelled", started.elapsed().as_secs_f64());
        return;
    }

    logger.log_error(&err.to_string());

    let max_retries = ctx.queue.max_retries();
    let retry_count = if err.is_permanent_failure() {
        max_retries
    } else {
        ctx.queue.increment_retry(message_id).await.unwrap_or(u32::MAX)
    };

    if retry_count < max_retries && err.is_retryable() {
        info!(
            "Job {} will be retried (attempt {}/{})",
            job.job_id, retry_count, max_retries
        );
        metrics::record_job("retry", started.elapsed().as_secs_f64());
        // Redelivered to a worker after the visibility timeout.
        return;
    }

    warn!("Job {} failed permanently, moving to DLQ", job.job_id);
    if let Err(dlq_err) = ctx.queue.dlq(message_id, job, &err.to_string()).await {
        error!("Failed to move job {} to DLQ: {}", job.job_id, dlq_err);
    }
    let message = err.to_string();
    if let Err(e) = ctx.queue.update_record(&job.job_id, |r| r.fail(message.clone())).await {
        warn!("Failed to mark job {} as failed: {}", job.job_id, e);
    }
    ctx.progress.error(&job.job_id, message).await.ok();
    if let Err(e) = ctx.queue.clear_dedup(&job.job_id, &job.request).await {
        warn!("Failed to clear dedup key for job {}: {}", job.job_id, e);
    }
    metrics::record_job("failed", started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use edu3d_queue::QueueConfig;

    #[test]
    fn test_admission() {
        assert_eq!(admission_for(JobStatus::Queued), Admission::Start);
        assert_eq!(admission_for(JobStatus::Running), Admission::Resume);
        assert_eq!(admission_for(JobStatus::Finished), Admission::Skip);
        assert_eq!(admission_for(JobStatus::Failed), Admission::Skip);
    }

    #[test]
    fn test_executor_creation() {
        let queue = JobQueue::new(QueueConfig::default()).unwrap();
        let config = WorkerConfig {
            max_concurrent_videos: 3,
            ..Default::default()
        };
        let executor = JobExecutor::new(config, queue).unwrap();
        assert_eq!(executor.job_semaphore.available_permits(), 3);
        assert!(executor.consumer_name.starts_with("worker-"));
        // Heartbeats are sent under the same name the entries are read with.
        assert_eq!(executor.ctx.consumer_name, executor.consumer_name);
    }
}
