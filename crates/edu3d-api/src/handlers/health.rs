//! Health check handlers.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use edu3d_media::disk::{format_bytes, free_space};
use edu3d_media::{probe_blender, probe_ffmpeg, ToolProbe};

use crate::config::ApiConfig;
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn ok(detail: Option<String>) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            detail,
            latency_ms: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            detail: None,
            latency_ms: None,
        }
    }

    fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

impl From<ToolProbe> for CheckStatus {
    fn from(probe: ToolProbe) -> Self {
        let check = if probe.ok {
            CheckStatus::ok(probe.version)
        } else {
            CheckStatus::error(probe.error.unwrap_or_else(|| "probe failed".to_string()))
        };
        check.with_latency(probe.latency_ms)
    }
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub blender: CheckStatus,
    pub ffmpeg: CheckStatus,
    pub disk_space: CheckStatus,
    pub openai_api_key: CheckStatus,
    pub google_api_key: CheckStatus,
}

impl HealthChecks {
    fn iter(&self) -> impl Iterator<Item = (&'static str, &CheckStatus)> {
        [
            ("blender", &self.blender),
            ("ffmpeg", &self.ffmpeg),
            ("disk_space", &self.disk_space),
            ("openai_api_key", &self.openai_api_key),
            ("google_api_key", &self.google_api_key),
        ]
        .into_iter()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub checks: HealthChecks,
}

async fn check_disk(config: &ApiConfig) -> CheckStatus {
    let dir = config.output_dir.clone();
    let min_free = config.min_free_disk_bytes;

    match tokio::task::spawn_blocking(move || free_space(&dir)).await {
        Ok(Ok(space)) if space.has_at_least(min_free) => CheckStatus::ok(Some(format!(
            "{} free at {}",
            format_bytes(space.free_bytes),
            space.path.display()
        ))),
        Ok(Ok(space)) => CheckStatus::error(format!(
            "only {} free at {} (minimum {})",
            format_bytes(space.free_bytes),
            space.path.display(),
            format_bytes(min_free)
        )),
        Ok(Err(e)) => CheckStatus::error(e.to_string()),
        Err(e) => CheckStatus::error(format!("disk check aborted: {e}")),
    }
}

fn check_key(name: &str, present: bool) -> CheckStatus {
    if present {
        CheckStatus::ok(None)
    } else {
        CheckStatus::error(format!("{name} is not set"))
    }
}

/// Run every dependency check. Never fails; problems become error checks.
pub async fn run_checks(config: &ApiConfig) -> HealthReport {
    let (blender, ffmpeg, disk_space) = tokio::join!(
        probe_blender(&config.tools),
        probe_ffmpeg(&config.tools),
        check_disk(config),
    );

    let checks = HealthChecks {
        blender: blender.into(),
        ffmpeg: ffmpeg.into(),
        disk_space,
        openai_api_key: check_key("OPENAI_API_KEY", config.openai_key_present),
        google_api_key: check_key("GOOGLE_API_KEY", config.google_key_present),
    };

    let mut healthy = true;
    for (name, check) in checks.iter().filter(|(_, c)| !c.is_ok()) {
        healthy = false;
        metrics::record_health_check_failure(name);
        warn!(check = name, error = ?check.error, "Health check failed");
    }

    HealthReport {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        checks,
    }
}

/// Dependency health: external binaries, disk space and API keys.
/// 200 only when every check passes.
pub async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthReport>, (StatusCode, Json<HealthReport>)> {
    let report = run_checks(&state.config).await;
    if report.status == "healthy" {
        Ok(Json(report))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(report)))
    }
}

/// Liveness response.
#[derive(Serialize)]
pub struct LivenessResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Liveness probe.
pub async fn healthz() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub redis: CheckStatus,
}

/// Readiness probe: the job queue must be reachable.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let start = Instant::now();
    let redis = match state.queue.ping().await {
        Ok(()) => CheckStatus::ok(None).with_latency(start.elapsed().as_millis() as u64),
        Err(e) => CheckStatus::error(e.to_string()),
    };

    if redis.is_ok() {
        if let Ok(len) = state.queue.len().await {
            metrics::set_queue_length(len);
        }
        if let Ok(len) = state.queue.dlq_len().await {
            metrics::set_dlq_length(len);
        }
    }

    let ok = redis.is_ok();
    let response = ReadinessResponse {
        status: if ok { "ready" } else { "not_ready" }.to_string(),
        checks: ReadinessChecks { redis },
    };

    if ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
