//! Headless Blender rendering.
//!
//! Scripts are run as `blender --background --python <script> -- <frames_dir> <width> <height> <frames>`
//! and must write PNG frames named `frame_0001.png`, `frame_0002.png`, ... into `frames_dir`.

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use edu3d_models::VideoQuality;

use crate::command::{join_tail, push_tail, wait_child};
use crate::error::{MediaError, MediaResult};

/// Default render timeout (30 minutes).
pub const DEFAULT_BLENDER_TIMEOUT_SECS: u64 = 1800;
/// Frame rate the default scene animates at.
pub const RENDER_FPS: u32 = 24;
/// Frame file pattern handed to FFmpeg.
pub const FRAME_PATTERN: &str = "frame_%04d.png";

/// Minimal scene: a rotating cube under a sun lamp, rendered with Eevee.
pub const DEFAULT_SCENE_SCRIPT: &str = r#"import sys
import bpy

argv = sys.argv[sys.argv.index("--") + 1:] if "--" in sys.argv else []
out_dir = argv[0] if len(argv) > 0 else "/tmp/frames"
width = int(argv[1]) if len(argv) > 1 else 1920
height = int(argv[2]) if len(argv) > 2 else 1080
frames = int(argv[3]) if len(argv) > 3 else 120

bpy.ops.object.select_all(action="SELECT")
bpy.ops.object.delete(use_global=False)

bpy.ops.mesh.primitive_cube_add(size=2, location=(0, 0, 0))
cube = bpy.context.active_object
mat = bpy.data.materials.new(name="ConceptMaterial")
mat.use_nodes = True
mat.node_tree.nodes["Principled BSDF"].inputs[0].default_value = (0.0, 0.5, 1.0, 1.0)
cube.data.materials.append(mat)

cube.rotation_euler = (0, 0, 0)
cube.keyframe_insert(data_path="rotation_euler", frame=1)
cube.rotation_euler = (0, 0, 6.283)
cube.keyframe_insert(data_path="rotation_euler", frame=frames)

bpy.ops.object.light_add(type="SUN", location=(5, 5, 10))
bpy.ops.object.camera_add(location=(7, -7, 5), rotation=(1.1, 0, 0.785))
scene = bpy.context.scene
scene.camera = bpy.context.active_object

scene.render.engine = "BLENDER_EEVEE"
scene.render.resolution_x = width
scene.render.resolution_y = height
scene.render.fps = 24
scene.frame_start = 1
scene.frame_end = frames
scene.render.image_settings.file_format = "PNG"
scene.render.filepath = out_dir.rstrip("/") + "/frame_"
bpy.ops.render.render(animation=True)
"#;

/// Frames written by a successful render, sorted by name.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub frames_dir: PathBuf,
    pub frames: Vec<PathBuf>,
}

impl RenderOutput {
    /// Pattern FFmpeg should read the sequence from.
    pub fn pattern(&self) -> PathBuf {
        self.frames_dir.join(FRAME_PATTERN)
    }
}

/// Runs Blender scripts in background mode.
pub struct BlenderRunner {
    binary: String,
    timeout_secs: u64,
    cancel_rx: Option<watch::Receiver<bool>>,
    /// Where scene scripts are written; the system temp dir when unset
    script_dir: Option<PathBuf>,
}

impl BlenderRunner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout_secs: DEFAULT_BLENDER_TIMEOUT_SECS,
            cancel_rx: None,
            script_dir: None,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn with_script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.script_dir = Some(dir.into());
        self
    }

    /// Arguments passed to Blender for one render.
    pub fn build_args(
        script: &Path,
        frames_dir: &Path,
        quality: VideoQuality,
        frame_count: u32,
    ) -> Vec<String> {
        let (w, h) = quality.resolution();
        vec![
            "--background".to_string(),
            "--python".to_string(),
            script.to_string_lossy().to_string(),
            "--".to_string(),
            frames_dir.to_string_lossy().to_string(),
            w.to_string(),
            h.to_string(),
            frame_count.to_string(),
        ]
    }

    /// Write `script` to a temp file and render it into `frames_dir`.
    pub async fn render(
        &self,
        script: &str,
        frames_dir: &Path,
        quality: VideoQuality,
        frame_count: u32,
    ) -> MediaResult<RenderOutput> {
        let binary = crate::tools::resolve("Blender", &self.binary)?;
        tokio::fs::create_dir_all(frames_dir).await?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("edu3d_scene_").suffix(".py");
        let mut script_file = match &self.script_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                builder.tempfile_in(dir)?
            }
            None => builder.tempfile()?,
        };
        script_file.write_all(script.as_bytes())?;
        script_file.flush()?;

        let args = Self::build_args(script_file.path(), frames_dir, quality, frame_count);
        info!(
            frames_dir = %frames_dir.display(),
            frame_count,
            timeout_secs = self.timeout_secs,
            "Starting Blender render"
        );
        debug!("Running Blender: {} {}", binary.display(), args.join(" "));

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
            .ok_or_else(|| MediaError::blender_failed("stderr not captured", None, None))?;
        let reader_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail = VecDeque::new();
            while let Ok(Some(line)) = lines.next_line().await {
                push_tail(&mut tail, line);
            }
            tail
        });

        let result = wait_child(
            &mut child,
            Some(self.timeout_secs),
            self.cancel_rx.clone(),
            "Blender",
        )
        .await;
        let tail = reader_handle.await.unwrap_or_default();
        // Script file lives until the process is done.
        drop(script_file);

        let status = result?;
        if !status.success() {
            let stderr = join_tail(tail);
            warn!(exit_code = ?status.code(), "Blender failed: {}", stderr.as_deref().unwrap_or(""));
            return Err(MediaError::blender_failed(
                "Blender exited with non-zero status",
                stderr,
                status.code(),
            ));
        }

        let frames = list_frames(frames_dir).await?;
        if frames.is_empty() {
            return Err(MediaError::NoFrames(frames_dir.to_path_buf()));
        }
        info!(frames = frames.len(), "Blender render complete");

        Ok(RenderOutput {
            frames_dir: frames_dir.to_path_buf(),
            frames,
        })
    }
}

/// PNG files in `dir`, sorted by file name.
pub async fn list_frames(dir: &Path) -> MediaResult<Vec<PathBuf>> {
    let mut frames = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_png = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("png"))
            .unwrap_or(false);
        if is_png {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}
