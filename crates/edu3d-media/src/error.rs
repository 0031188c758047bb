//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while driving external tools.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{tool} not found: {path}")]
    ToolNotFound { tool: &'static str, path: String },

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Blender render failed: {message}")]
    BlenderFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Render produced no frames in {0}")]
    NoFrames(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Disk check failed for {path}: {message}")]
    Disk { path: PathBuf, message: String },
}

impl MediaError {
    pub fn tool_not_found(tool: &'static str, path: impl Into<String>) -> Self {
        Self::ToolNotFound {
            tool,
            path: path.into(),
        }
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn blender_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::BlenderFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn disk(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Disk {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether retrying the same operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, MediaError::Timeout(_) | MediaError::Io(_))
    }
}
