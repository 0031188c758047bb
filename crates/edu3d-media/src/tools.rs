//! Locations of the external binaries.

use std::path::PathBuf;

use crate::error::{MediaError, MediaResult};

pub const DEFAULT_BLENDER: &str = "blender";
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

/// Configured paths (or bare names resolved through `PATH`) for Blender and FFmpeg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub blender: String,
    pub ffmpeg: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            blender: DEFAULT_BLENDER.to_string(),
            ffmpeg: DEFAULT_FFMPEG.to_string(),
        }
    }
}

impl ToolPaths {
    /// Read `BLENDER_PATH` / `FFMPEG_PATH`, ignoring empty values.
    pub fn from_env() -> Self {
        let read = |key: &str, default: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            blender: read("BLENDER_PATH", DEFAULT_BLENDER),
            ffmpeg: read("FFMPEG_PATH", DEFAULT_FFMPEG),
        }
    }

    pub fn resolve_ffmpeg(&self) -> MediaResult<PathBuf> {
        resolve("FFmpeg", &self.ffmpeg)
    }

    pub fn resolve_blender(&self) -> MediaResult<PathBuf> {
        resolve("Blender", &self.blender)
    }
}

/// Resolve a configured binary: explicit paths must exist, bare names go through `which`.
pub fn resolve(tool: &'static str, configured: &str) -> MediaResult<PathBuf> {
    let path = PathBuf::from(configured);
    if path.components().count() > 1 || path.is_absolute() {
        if path.is_file() {
            return Ok(path);
        }
        return Err(MediaError::tool_not_found(tool, configured));
    }
    which::which(configured).map_err(|_| MediaError::tool_not_found(tool, configured))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_absolute_path() {
        let err = resolve("Blender", "/definitely/not/here/blender").unwrap_err();
        assert!(matches!(err, MediaError::ToolNotFound { tool: "Blender", .. }));
    }

    #[test]
    fn test_missing_bare_name() {
        assert!(resolve("FFmpeg", "edu3d-no-such-binary-xyz").is_err());
    }

    #[test]
    fn test_existing_explicit_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().to_string();
        assert_eq!(resolve("FFmpeg", &path).unwrap(), file.path());
    }
}
