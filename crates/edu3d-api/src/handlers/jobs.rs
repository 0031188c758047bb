//! Job status handlers.

use axum::extract::{Path, State};
use axum::Json;

use edu3d_models::{JobId, JobRecord, JobStatus, VideoResult};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::validation::is_valid_job_id;

async fn load_record(state: &AppState, job_id: &str) -> ApiResult<JobRecord> {
    if !is_valid_job_id(job_id) {
        return Err(ApiError::validation("Invalid job ID format"));
    }
    let job_id = JobId::from_string(job_id);
    state
        .queue
        .record(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Job {job_id} not found")))
}

/// Full job record: status, progress, current step, result or error.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobRecord>> {
    load_record(&state, &job_id).await.map(Json)
}

/// Result of a finished job; 409 while it is queued, running or failed.
pub async fn get_job_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<VideoResult>> {
    let record = load_record(&state, &job_id).await?;

    match (record.status, record.result) {
        (JobStatus::Finished, Some(result)) => Ok(Json(result)),
        (JobStatus::Failed, _) => Err(ApiError::conflict(format!(
            "Job {} failed: {}",
            record.job_id,
            record.error.as_deref().unwrap_or("unknown error")
        ))),
        (status, _) => Err(ApiError::conflict(format!(
            "Job {} is {}",
            record.job_id,
            status.as_str()
        ))),
    }
}
