//! Application state.

use std::sync::Arc;

use edu3d_queue::{JobQueue, QueueConfig, QueueResult};

use crate::config::ApiConfig;
use crate::rate_limit::UserRateLimiter;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub queue: Arc<JobQueue>,
    /// Per-user limiter for video submissions
    pub user_limiter: Arc<UserRateLimiter>,
}

impl AppState {
    /// Create new application state.
    ///
    /// The Redis client connects lazily, so this succeeds with Redis down;
    /// `/ready` reports it.
    pub fn new(config: ApiConfig) -> QueueResult<Self> {
        let queue = JobQueue::new(QueueConfig {
            redis_url: config.redis_url.clone(),
            ..QueueConfig::from_env()
        })?;
        let user_limiter = UserRateLimiter::new(config.rate_limit_per_minute);

        Ok(Self {
            config,
            queue: Arc::new(queue),
            user_limiter: Arc::new(user_limiter),
        })
    }
}
