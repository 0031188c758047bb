//! Placeholder outputs used when rendering is not possible.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use edu3d_models::VideoQuality;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Longest placeholder video we generate.
pub const MAX_PLACEHOLDER_SECS: u32 = 10;
pub const PLACEHOLDER_FILE: &str = "fallback_video.mp4";
pub const PREVIEW_FILE: &str = "video_preview.html";
const PLACEHOLDER_COLOR: &str = "0x667eea";

/// Which fallback artifact was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackArtifact {
    Video(PathBuf),
    /// FFmpeg was unavailable; an HTML page was written instead
    HtmlPreview(PathBuf),
}

impl FallbackArtifact {
    pub fn path(&self) -> &Path {
        match self {
            FallbackArtifact::Video(p) | FallbackArtifact::HtmlPreview(p) => p,
        }
    }
}

/// Produce a placeholder video in `output_dir`, or an HTML preview when FFmpeg fails.
pub async fn create_fallback(
    ffmpeg: &FfmpegRunner,
    output_dir: &Path,
    topic: &str,
    quality: VideoQuality,
    duration_secs: u32,
) -> MediaResult<FallbackArtifact> {
    tokio::fs::create_dir_all(output_dir).await?;

    let video = output_dir.join(PLACEHOLDER_FILE);
    let secs = duration_secs.clamp(1, MAX_PLACEHOLDER_SECS);
    let cmd = FfmpegCommand::placeholder(&video, quality, secs, PLACEHOLDER_COLOR);

    match ffmpeg.run(&cmd).await {
        Ok(()) => {
            info!(path = %video.display(), secs, "Wrote placeholder video");
            Ok(FallbackArtifact::Video(video))
        }
        Err(e) => {
            warn!("Placeholder video failed ({}), writing HTML preview", e);
            let html = write_html_preview(output_dir, topic).await?;
            Ok(FallbackArtifact::HtmlPreview(html))
        }
    }
}

pub async fn write_html_preview(output_dir: &Path, topic: &str) -> MediaResult<PathBuf> {
    tokio::fs::create_dir_all(output_dir).await?;
    let path = output_dir.join(PREVIEW_FILE);
    tokio::fs::write(&path, preview_html(topic)).await?;
    Ok(path)
}

pub fn preview_html(topic: &str) -> String {
    let topic = escape_html(topic);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>3D Educational Video - {topic}</title>
  <style>
    body {{ font-family: Arial, sans-serif; background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); color: white; text-align: center; padding: 50px; }}
    .video-container {{ background: rgba(255,255,255,0.1); border-radius: 20px; padding: 40px; margin: 20px auto; max-width: 800px; }}
    .topic {{ font-size: 2.5em; margin-bottom: 20px; }}
    .description {{ font-size: 1.2em; opacity: 0.9; }}
  </style>
</head>
<body>
  <div class="video-container">
    <div class="topic">{topic}</div>
    <div class="description">
      This educational video will demonstrate the key concepts of {topic}
      through 3D visualizations and animations.
    </div>
    <p>The rendering tools were unavailable, so only this preview was generated.</p>
  </div>
</body>
</html>
"#
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_escapes_topic() {
        let html = preview_html("<script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[tokio::test]
    async fn test_falls_back_to_html_without_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("job");
        let runner = FfmpegRunner::new("/nonexistent/ffmpeg");

        let artifact = create_fallback(&runner, &out, "Gravity", VideoQuality::Hd720, 120)
            .await
            .unwrap();

        match &artifact {
            FallbackArtifact::HtmlPreview(path) => {
                assert_eq!(path.file_name().unwrap(), PREVIEW_FILE);
                let html = tokio::fs::read_to_string(path).await.unwrap();
                assert!(html.contains("Gravity"));
            }
            other => panic!("expected HTML preview, got {other:?}"),
        }
    }
}
