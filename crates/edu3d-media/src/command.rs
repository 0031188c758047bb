//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use edu3d_models::VideoQuality;

use crate::error::{MediaError, MediaResult};

/// Frame rate of every video we produce.
pub const OUTPUT_FPS: u32 = 30;
/// Lines of stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path or lavfi source
    input: String,
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self::from_source(input.as_ref().to_string_lossy(), output)
    }

    /// Command whose input is not a file (e.g. a lavfi graph).
    pub fn from_source(source: impl Into<String>, output: impl AsRef<Path>) -> Self {
        Self {
            input: source.into(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Encode a numbered image sequence (`frame_%04d.png`) into an H.264 MP4.
    pub fn encode_frames(
        pattern: impl AsRef<Path>,
        output: impl AsRef<Path>,
        fps: u32,
        quality: VideoQuality,
    ) -> Self {
        Self::new(pattern, output)
            .input_arg("-framerate")
            .input_arg(fps.to_string())
            .video_filter(fit_filter(quality))
            .h264()
            .output_arg("-r")
            .output_arg(OUTPUT_FPS.to_string())
    }

    /// Stitch still images listed in an FFmpeg concat file into a slideshow MP4.
    pub fn slideshow(
        concat_list: impl AsRef<Path>,
        output: impl AsRef<Path>,
        quality: VideoQuality,
    ) -> Self {
        Self::new(concat_list, output)
            .input_args(["-f", "concat", "-safe", "0"])
            .video_filter(fit_filter(quality))
            .h264()
            .output_arg("-r")
            .output_arg(OUTPUT_FPS.to_string())
    }

    /// Solid colour card of the given length, used as a placeholder video.
    pub fn placeholder(
        output: impl AsRef<Path>,
        quality: VideoQuality,
        duration_secs: u32,
        color: &str,
    ) -> Self {
        let (w, h) = quality.resolution();
        let source = format!("color=c={color}:s={w}x{h}:r={OUTPUT_FPS}:d={duration_secs}");
        Self::from_source(source, output)
            .input_args(["-f", "lavfi"])
            .h264()
            .output_arg("-t")
            .output_arg(duration_secs.to_string())
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Web-friendly H.264 settings shared by every output.
    pub fn h264(self) -> Self {
        self.video_codec("libx264")
            .preset("medium")
            .crf(20)
            .output_args(["-pix_fmt", "yuv420p", "-movflags", "+faststart"])
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.clone());

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Scale into the target frame keeping aspect ratio, padding the rest.
pub fn fit_filter(quality: VideoQuality) -> String {
    let (w, h) = quality.resolution();
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,format=yuv420p"
    )
}

/// Contents of a concat-demuxer list showing each image for `per_frame_secs`.
///
/// The last image is repeated because the demuxer ignores the final `duration`.
pub fn concat_list(images: &[PathBuf], per_frame_secs: f64) -> String {
    let mut out = String::new();
    for image in images {
        out.push_str(&format!("file '{}'\n", escape_concat_path(image)));
        out.push_str(&format!("duration {:.3}\n", per_frame_secs));
    }
    if let Some(last) = images.last() {
        out.push_str(&format!("file '{}'\n", escape_concat_path(last)));
    }
    out
}

fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}

/// Runner for FFmpeg commands with timeout and cancellation.
pub struct FfmpegRunner {
    binary: String,
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    /// Runner using the given binary (path or name on `PATH`).
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            cancel_rx: None,
            timeout_secs: None,
        }
    }

    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let binary = crate::tools::resolve("FFmpeg", &self.binary)?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", binary.display(), args.join(" "));

        let mut child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("stderr not captured", None, None))?;
        let mut reader = BufReader::new(stderr).lines();

        let reader_handle = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            while let Ok(Some(line)) = reader.next_line().await {
                push_tail(&mut tail, line);
            }
            tail
        });

        let result = wait_child(&mut child, self.timeout_secs, self.cancel_rx.clone(), "FFmpeg").await;
        let tail = reader_handle.await.unwrap_or_default();

        let status = result?;
        if status.success() {
            Ok(())
        } else {
            let stderr = join_tail(tail);
            warn!(exit_code = ?status.code(), "FFmpeg failed: {}", stderr.as_deref().unwrap_or(""));
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                stderr,
                status.code(),
            ))
        }
    }
}

/// Wait for a child process, honouring an optional timeout and cancellation signal.
pub(crate) async fn wait_child(
    child: &mut Child,
    timeout_secs: Option<u64>,
    cancel_rx: Option<watch::Receiver<bool>>,
    name: &str,
) -> MediaResult<ExitStatus> {
    let deadline = async {
        match timeout_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    let cancelled = async {
        match cancel_rx {
            Some(mut rx) => {
                while !*rx.borrow() {
                    if rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        status = child.wait() => Ok(status?),
        _ = deadline => {
            let secs = timeout_secs.unwrap_or_default();
            warn!("{} timed out after {} seconds, killing process", name, secs);
            let _ = child.kill().await;
            Err(MediaError::Timeout(secs))
        }
        _ = cancelled => {
            info!("{} cancelled, killing process", name);
            let _ = child.kill().await;
            Err(MediaError::Cancelled)
        }
    }
}

pub(crate) fn push_tail(tail: &mut VecDeque<String>, line: String) {
    if line.trim().is_empty() {
        return;
    }
    if tail.len() == STDERR_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line);
}

pub(crate) fn join_tail(tail: VecDeque<String>) -> Option<String> {
    if tail.is_empty() {
        None
    } else {
        Some(Vec::from(tail).join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(args: &[String], needle: &str) -> usize {
        args.iter().position(|a| a == needle).unwrap()
    }

    #[test]
    fn test_encode_frames_args() {
        let cmd = FfmpegCommand::encode_frames(
            "/out/frames/frame_%04d.png",
            "/out/final_video.mp4",
            24,
            VideoQuality::Hd720,
        );
        let args = cmd.build_args();

        assert_eq!(args[0], "-y");
        // input options come before -i
        assert!(pos(&args, "-framerate") < pos(&args, "-i"));
        assert_eq!(args[pos(&args, "-framerate") + 1], "24");
        assert_eq!(args[pos(&args, "-i") + 1], "/out/frames/frame_%04d.png");
        assert!(args[pos(&args, "-vf") + 1].starts_with("scale=1280:720"));
        assert_eq!(args[pos(&args, "-c:v") + 1], "libx264");
        assert_eq!(args.last().unwrap(), "/out/final_video.mp4");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_reports_stderr_tail() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = dir.path().join("ffmpeg");
        std::fs::write(
            &ffmpeg,
            "#!/bin/sh\necho 'frame=1' >&2\necho 'Unknown encoder libx264' >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&ffmpeg, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cmd = FfmpegCommand::placeholder(dir.path().join("v.mp4"), VideoQuality::Hd720, 5, "navy");
        assert!(!cmd.build_args().iter().any(|a| a == "-progress"));

        let err = FfmpegRunner::new(ffmpeg.to_string_lossy())
            .with_timeout(10)
            .run(&cmd)
            .await
            .unwrap_err();
        match err {
            MediaError::FfmpegFailed { stderr, exit_code, .. } => {
                assert_eq!(exit_code, Some(1));
                assert_eq!(stderr.as_deref(), Some("frame=1\nUnknown encoder libx264"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_slideshow_args() {
        let cmd = FfmpegCommand::slideshow("/tmp/list.txt", "/out/v.mp4", VideoQuality::Uhd4k);
        let args = cmd.build_args();

        assert!(pos(&args, "concat") < pos(&args, "-i"));
        assert_eq!(args[pos(&args, "-safe") + 1], "0");
        assert!(args[pos(&args, "-vf") + 1].contains("pad=3840:2160"));
        assert_eq!(args[pos(&args, "-pix_fmt") + 1], "yuv420p");
    }

    #[test]
    fn test_placeholder_args() {
        let cmd = FfmpegCommand::placeholder("/out/v.mp4", VideoQuality::Hd1080, 10, "navy");
        let args = cmd.build_args();

        assert_eq!(args[pos(&args, "-f") + 1], "lavfi");
        assert_eq!(
            args[pos(&args, "-i") + 1],
            "color=c=navy:s=1920x1080:r=30:d=10"
        );
        assert_eq!(args[pos(&args, "-t") + 1], "10");
    }

    #[test]
    fn test_concat_list() {
        let images = vec![PathBuf::from("/a/one.png"), PathBuf::from("/a/it's.png")];
        let list = concat_list(&images, 2.5);
        let lines: Vec<&str> = list.lines().collect();
        assert_eq!(
            lines,
            vec![
                "file '/a/one.png'",
                "duration 2.500",
                "file '/a/it'\\''s.png'",
                "duration 2.500",
                "file '/a/it'\\''s.png'",
            ]
        );
        assert!(concat_list(&[], 1.0).is_empty());
    }

    #[test]
    fn test_tail_is_bounded() {
        let mut tail = VecDeque::new();
        for i in 0..(STDERR_TAIL_LINES + 5) {
            push_tail(&mut tail, format!("line {i}"));
        }
        push_tail(&mut tail, "   ".into());
        assert_eq!(tail.len(), STDERR_TAIL_LINES);
        assert_eq!(tail.front().unwrap(), "line 5");
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let runner = FfmpegRunner::new("/nonexistent/ffmpeg");
        let cmd = FfmpegCommand::placeholder("/tmp/x.mp4", VideoQuality::Hd720, 1, "black");
        let err = runner.run(&cmd).await.unwrap_err();
        assert!(matches!(err, MediaError::ToolNotFound { .. }));
    }
}
