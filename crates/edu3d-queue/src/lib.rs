//! Redis Streams job queue for video generation.
//!
//! This crate provides:
//! - Job enqueueing via Redis Streams with duplicate-submission rejection
//! - Job records (status, progress, result) with a 7 day TTL
//! - Worker consumption with retry/DLQ and claiming of abandoned jobs
//! - Progress events via Redis Pub/Sub

pub mod error;
pub mod job;
pub mod progress;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{Delivery, JOB_RECORD_TTL_SECS};
pub use progress::{Milestone, ProgressChannel, ProgressEvent};
pub use queue::{heartbeat_interval, JobQueue, QueueConfig};
