//! Stream payload encoding and Redis key layout.

use std::collections::HashMap;

use edu3d_models::{JobId, VideoJob, VideoRequest};

use crate::error::QueueResult;

/// Job records are kept for 7 days.
pub const JOB_RECORD_TTL_SECS: u64 = 7 * 24 * 60 * 60;
/// Retry counters outlive any reasonable redelivery window.
pub const RETRY_COUNTER_TTL_SECS: i64 = 24 * 60 * 60;

const KEY_PREFIX: &str = "edu3d";

/// Redis key holding the serialized [`edu3d_models::JobRecord`].
pub fn record_key(job_id: &JobId) -> String {
    format!("{KEY_PREFIX}:job:{job_id}")
}

/// Redis key marking an in-flight request; its value is the owning job id.
pub fn dedup_key(request: &VideoRequest) -> String {
    format!("{KEY_PREFIX}:dedup:{}", request.dedup_key())
}

pub fn retry_key(message_id: &str) -> String {
    format!("{KEY_PREFIX}:retry:{message_id}")
}

/// Pub/sub channel carrying progress events for one job.
pub fn progress_channel(job_id: &JobId) -> String {
    format!("{KEY_PREFIX}:progress:{job_id}")
}

/// A job read from the stream, with the message id needed to ack it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message_id: String,
    pub job: VideoJob,
}

/// Field/value pairs written with XADD.
pub fn encode_fields(job: &VideoJob) -> QueueResult<Vec<(&'static str, String)>> {
    Ok(vec![
        ("job", serde_json::to_string(job)?),
        ("job_id", job.job_id.to_string()),
    ])
}

/// Decode the `job` field of a stream entry. `None` when absent or malformed.
pub fn decode_entry(map: &HashMap<String, redis::Value>) -> Option<Result<VideoJob, serde_json::Error>> {
    match map.get("job")? {
        redis::Value::BulkString(bytes) => Some(serde_json::from_slice(bytes)),
        redis::Value::SimpleString(s) => Some(serde_json::from_str(s)),
        _ => None,
    }
}
