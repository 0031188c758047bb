//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use edu3d_media::blender::DEFAULT_BLENDER_TIMEOUT_SECS;
use edu3d_media::ToolPaths;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

/// OpenAI chat completions settings.
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Gemini image generation settings.
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    /// Tried in order until one succeeds
    pub image_models: Vec<String>,
}

// API keys stay out of logs.
impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("base_url", &self.base_url)
            .field("image_models", &self.image_models)
            .finish_non_exhaustive()
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum videos generated at the same time
    pub max_concurrent_videos: usize,
    /// Root directory for finished videos
    pub output_dir: PathBuf,
    /// Scratch space for temporary files
    pub work_dir: PathBuf,
    pub tools: ToolPaths,
    pub blender_timeout: Duration,
    pub ffmpeg_timeout: Duration,
    pub openai: Option<OpenAiConfig>,
    pub gemini: Option<GeminiConfig>,
    /// How often the worker scans for orphaned pending jobs
    pub claim_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Port for the Prometheus scrape endpoint; disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_videos: 2,
            output_dir: PathBuf::from("./output"),
            work_dir: PathBuf::from("/tmp/edu3d"),
            tools: ToolPaths::default(),
            blender_timeout: Duration::from_secs(DEFAULT_BLENDER_TIMEOUT_SECS),
            ffmpeg_timeout: Duration::from_secs(600),
            openai: None,
            gemini: None,
            claim_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(60),
            metrics_port: None,
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_non_empty(key).and_then(|v| v.parse().ok())
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let openai = env_non_empty("OPENAI_API_KEY").map(|api_key| OpenAiConfig {
            api_key,
            base_url: env_non_empty("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            model: env_non_empty("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
        });

        let gemini = env_non_empty("GOOGLE_API_KEY").map(|api_key| GeminiConfig {
            api_key,
            base_url: env_non_empty("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            image_models: env_non_empty("GEMINI_IMAGE_MODEL")
                .map(|v| v.split(',').map(|m| m.trim().to_string()).filter(|m| !m.is_empty()).collect())
                .unwrap_or_else(|| vec![DEFAULT_GEMINI_IMAGE_MODEL.to_string()]),
        });

        Self {
            max_concurrent_videos: env_parse::<usize>("MAX_CONCURRENT_VIDEOS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_videos),
            output_dir: env_non_empty("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            work_dir: env_non_empty("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            tools: ToolPaths::from_env(),
            blender_timeout: env_parse("BLENDER_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.blender_timeout),
            ffmpeg_timeout: env_parse("FFMPEG_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ffmpeg_timeout),
            openai,
            gemini,
            claim_interval: env_parse("WORKER_CLAIM_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_interval),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            metrics_port: env_parse("WORKER_METRICS_PORT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_videos, 2);
        assert_eq!(config.blender_timeout, Duration::from_secs(1800));
        assert!(config.openai.is_none());
    }

    #[test]
    fn test_debug_hides_keys() {
        let openai = OpenAiConfig {
            api_key: "sk-secret".into(),
            base_url: DEFAULT_OPENAI_BASE_URL.into(),
            model: DEFAULT_OPENAI_MODEL.into(),
        };
        let printed = format!("{openai:?}");
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains(DEFAULT_OPENAI_MODEL));
    }
}
