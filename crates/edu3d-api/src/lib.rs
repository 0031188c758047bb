//! Axum HTTP API server.
//!
//! This crate provides:
//! - Video submission with per-user rate limiting and input validation
//! - Job status and result lookup backed by the Redis queue
//! - Dependency health checks (Blender, FFmpeg, disk, API keys)
//! - The example topic catalog
//! - Security headers, per-IP limiting and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod validation;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use rate_limit::UserRateLimiter;
pub use routes::create_router;
pub use state::AppState;
