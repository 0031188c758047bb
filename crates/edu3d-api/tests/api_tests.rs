//! API integration tests.
//!
//! Redis is pointed at a closed port: everything except enqueue/lookup works
//! without it.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use edu3d_api::{create_router, ApiConfig, AppState};
use edu3d_media::ToolPaths;
use serde_json::{json, Value};
use tower::ServiceExt;

const UNREACHABLE_REDIS: &str = "redis://127.0.0.1:1";

fn base_config() -> ApiConfig {
    ApiConfig {
        redis_url: UNREACHABLE_REDIS.to_string(),
        output_dir: std::env::temp_dir(),
        min_free_disk_bytes: 0,
        openai_key_present: true,
        google_key_present: true,
        tools: ToolPaths {
            blender: "/nonexistent/blender".into(),
            ffmpeg: "/nonexistent/ffmpeg".into(),
        },
        ..Default::default()
    }
}

fn router(config: ApiConfig) -> Router {
    let state = AppState::new(config).expect("state");
    create_router(state, None)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn video_body(user_id: &str) -> Value {
    json!({
        "user_id": user_id,
        "topic": "Photosynthesis",
        "subject": "Biology",
        "level": "High School"
    })
}

#[cfg(unix)]
fn fake_tool(dir: &std::path::Path, name: &str, banner: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\necho '{banner}'\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().to_string()
}

#[cfg(unix)]
fn config_with_fake_tools(dir: &std::path::Path) -> ApiConfig {
    ApiConfig {
        tools: ToolPaths {
            blender: fake_tool(dir, "blender", "Blender 4.1.0"),
            ffmpeg: fake_tool(dir, "ffmpeg", "ffmpeg version 6.1"),
        },
        ..base_config()
    }
}

#[tokio::test]
async fn test_health_unhealthy_when_binaries_missing() {
    let (status, _, body) = send(router(base_config()), get("/health")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["checks"]["blender"]["status"], "error");
    assert_eq!(body["checks"]["ffmpeg"]["status"], "error");
    assert_eq!(body["checks"]["disk_space"]["status"], "ok");
    assert_eq!(body["checks"]["openai_api_key"]["status"], "ok");
}

#[cfg(unix)]
#[tokio::test]
async fn test_health_unhealthy_when_api_key_unset() {
    let dir = tempfile::tempdir().unwrap();
    let config = ApiConfig {
        google_key_present: false,
        ..config_with_fake_tools(dir.path())
    };

    let (status, _, body) = send(router(config), get("/health")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["checks"]["blender"]["status"], "ok");
    assert_eq!(body["checks"]["google_api_key"]["status"], "error");
    assert_eq!(body["checks"]["google_api_key"]["error"], "GOOGLE_API_KEY is not set");
}

#[cfg(unix)]
#[tokio::test]
async fn test_health_ok_when_all_checks_pass() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_fake_tools(dir.path());

    let (status, _, body) = send(router(config), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["blender"]["detail"], "Blender 4.1.0");
    assert_eq!(body["checks"]["ffmpeg"]["detail"], "ffmpeg version 6.1");
}

#[tokio::test]
async fn test_healthz_and_security_headers() {
    let (status, headers, body) = send(router(base_config()), get("/healthz")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_ready_reports_unreachable_redis() {
    let (status, _, body) = send(router(base_config()), get("/ready")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["checks"]["redis"]["status"], "error");
}

#[tokio::test]
async fn test_create_video_validation_errors() {
    let cases = [
        json!({"user_id": "u1", "topic": "   ", "subject": "Biology", "level": "College"}),
        json!({"user_id": "u1", "topic": "x".repeat(501), "subject": "Biology", "level": "College"}),
        json!({"user_id": "u1", "topic": "Cells", "subject": "Astrology", "level": "College"}),
        json!({"user_id": "u1", "topic": "Cells", "subject": "Biology", "level": "Nursery"}),
        json!({"user_id": "u1", "topic": "Cells", "subject": "Biology", "level": "College", "duration": 10}),
        json!({"user_id": "not valid!", "topic": "Cells", "subject": "Biology", "level": "College"}),
        json!({"topic": "Cells", "subject": "Biology", "level": "College"}),
    ];

    for body in cases {
        let (status, _, response) =
            send(router(base_config()), post_json("/api/videos", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
        assert!(response["detail"].is_string());
    }
}

#[tokio::test]
async fn test_create_video_malformed_json_is_400() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/videos")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, _, _) = send(router(base_config()), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_user_rate_limit_rejects_eleventh_submission() {
    let app = router(base_config());

    for _ in 0..10 {
        let (status, _, _) = send(app.clone(), post_json("/api/videos", &video_body("alice"))).await;
        // Passed the limiter and failed at the unreachable queue.
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    let (status, headers, body) =
        send(app.clone(), post_json("/api/videos", &video_body("alice"))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "rate_limited");
    let retry_after: u64 = headers[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));

    // Other users are unaffected.
    let (status, _, _) = send(app, post_json("/api/videos", &video_body("bob"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_padded_user_id_shares_the_trimmed_bucket() {
    let app = router(base_config());

    // Accepted past validation, so it reaches the unreachable queue.
    let (status, _, _) = send(app.clone(), post_json("/api/videos", &video_body(" carol "))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    for _ in 0..9 {
        send(app.clone(), post_json("/api/videos", &video_body("carol"))).await;
    }
    let (status, _, _) = send(app, post_json("/api/videos", &video_body("carol  "))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_job_lookup_rejects_malformed_id() {
    let (status, _, _) = send(router(base_config()), get("/api/jobs/bad")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_example_catalog_endpoints() {
    let app = router(base_config());

    let (status, _, all) = send(app.clone(), get("/api/examples")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!all.as_array().unwrap().is_empty());

    let (status, _, physics) = send(app.clone(), get("/api/examples/physics")).await;
    assert_eq!(status, StatusCode::OK);
    let first_key = physics[0]["key"].as_str().unwrap().to_string();
    assert!(physics
        .as_array()
        .unwrap()
        .iter()
        .all(|e| e["subject"] == "Physics"));

    let (status, _, example) =
        send(app.clone(), get(&format!("/api/examples/Physics/{first_key}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(example["key"], first_key.as_str());

    let (status, _, _) = send(app.clone(), get("/api/examples/Physics/no_such_topic")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(app, get("/api/examples/Astrology")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// End-to-end submission and lookup against a live Redis.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_submit_and_poll_job() {
    dotenvy::dotenv().ok();

    let config = ApiConfig {
        redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into()),
        ..base_config()
    };
    let app = router(config);
    let user = format!("it-{}", uuid::Uuid::new_v4());

    let (status, _, body) = send(app.clone(), post_json("/api/videos", &video_body(&user))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let (status, _, dup) = send(app.clone(), post_json("/api/videos", &video_body(&user))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(dup["code"], "duplicate_job");

    let (status, _, record) = send(app.clone(), get(&format!("/api/jobs/{job_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "queued");
    assert_eq!(record["request"]["subject"], "Biology");

    let (status, _, _) = send(app, get(&format!("/api/jobs/{job_id}/result"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}
