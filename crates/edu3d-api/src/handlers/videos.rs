//! Video submission handler.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};

use edu3d_models::{JobId, JobStatus};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use crate::validation::CreateVideoRequest;

#[derive(Serialize)]
pub struct CreateVideoResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Queue a video for generation.
///
/// The user id is checked before rate limiting; every other field after it.
pub async fn create_video(
    State(state): State<AppState>,
    payload: Result<Json<CreateVideoRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreateVideoResponse>)> {
    let Json(payload) = payload.map_err(|e| ApiError::validation(e.body_text()))?;

    let user_id = payload.checked_user_id()?;
    if let Err(e) = state.user_limiter.enforce(user_id) {
        warn!(user_id, "Video submission rate limited");
        metrics::record_rate_limit_hit("user", "/api/videos");
        return Err(e);
    }

    let request = payload.into_video_request(&state.config)?;
    let method = request.method;
    let job_id = state.queue.enqueue(request).await?;

    metrics::record_job_enqueued(method.as_str());
    info!(job_id = %job_id, method = %method, "Video job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateVideoResponse {
            job_id,
            status: JobStatus::Queued,
        }),
    ))
}
