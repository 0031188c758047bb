//! API configuration.

use std::path::PathBuf;

use edu3d_media::disk::DEFAULT_MIN_FREE_BYTES;
use edu3d_media::ToolPaths;
use edu3d_models::{Language, VideoQuality};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    pub redis_url: String,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Video submissions per user per minute
    pub rate_limit_per_minute: usize,
    /// Per-IP requests per second on /api routes
    pub rate_limit_rps: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Minimum free bytes on the output filesystem for /health
    pub min_free_disk_bytes: u64,
    pub output_dir: PathBuf,
    pub tools: ToolPaths,
    /// Whether OPENAI_API_KEY is set (the key itself is only used by the worker)
    pub openai_key_present: bool,
    /// Whether GOOGLE_API_KEY is set
    pub google_key_present: bool,
    /// Quality used when a request does not name one
    pub default_quality: VideoQuality,
    /// Language used when a request does not name one
    pub default_language: Language,
    /// Environment (development/production)
    pub environment: String,
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            redis_url: "redis://localhost:6379".to_string(),
            cors_origins: vec!["*".to_string()],
            rate_limit_per_minute: 10,
            rate_limit_rps: 10,
            max_body_size: 1024 * 1024, // 1MB
            min_free_disk_bytes: DEFAULT_MIN_FREE_BYTES,
            output_dir: PathBuf::from("./output"),
            tools: ToolPaths::default(),
            openai_key_present: false,
            google_key_present: false,
            default_quality: VideoQuality::default(),
            default_language: Language::default(),
            environment: "development".to_string(),
            metrics_enabled: true,
        }
    }
}

fn key_present(key: &str) -> bool {
    std::env::var(key)
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_per_minute: env_parse("RATE_LIMIT_PER_MINUTE")
                .unwrap_or(defaults.rate_limit_per_minute),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS").unwrap_or(defaults.rate_limit_rps),
            max_body_size: env_parse("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            min_free_disk_bytes: env_parse("MIN_FREE_DISK_BYTES")
                .unwrap_or(defaults.min_free_disk_bytes),
            output_dir: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            tools: ToolPaths::from_env(),
            openai_key_present: key_present("OPENAI_API_KEY"),
            google_key_present: key_present("GOOGLE_API_KEY"),
            default_quality: env_parse("VIDEO_QUALITY").unwrap_or(defaults.default_quality),
            default_language: env_parse("DEFAULT_LANGUAGE").unwrap_or(defaults.default_language),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.rate_limit_per_minute, 10);
        assert_eq!(config.min_free_disk_bytes, 1024 * 1024 * 1024);
        assert_eq!(config.default_quality, VideoQuality::Hd1080);
        assert!(!config.is_production());
    }

    #[test]
    fn test_production_detection() {
        let config = ApiConfig {
            environment: "Production".into(),
            ..Default::default()
        };
        assert!(config.is_production());
    }
}
