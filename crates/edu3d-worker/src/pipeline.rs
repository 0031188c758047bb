//! Video generation pipeline.
//!
//! Runs the agents for one request: content analysis, then either the
//! Blender path (scene design, render, encode) or the image workflow path
//! (workflow design, Gemini images, slideshow). Hybrid tries Blender first
//! and then the image workflow. If every path fails a placeholder video (or
//! an HTML preview without FFmpeg) is produced, so media and AI failures
//! never fail the job on their own.

use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use edu3d_media::blender::RENDER_FPS;
use edu3d_media::{
    concat_list, create_fallback, BlenderRunner, FfmpegCommand, FfmpegRunner, MediaError,
};
use edu3d_models::{
    GenerationMethod, JobId, TopicAnalysis, VideoRequest, VideoResult, VisualWorkflow,
};
use edu3d_queue::Milestone;

use crate::analyzer::ContentAnalyzer;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::gemini::GeminiImageClient;
use crate::openai::OpenAiClient;
use crate::scene_designer::{SceneDesigner, SceneScript};
use crate::visual_workflow::WorkflowExecutor;

pub const FINAL_VIDEO_FILE: &str = "final_video.mp4";
pub const WORKFLOW_FILE: &str = "workflow.json";

/// Forwards milestones, dropping any that would move progress backwards.
struct MilestoneSender {
    tx: mpsc::UnboundedSender<Milestone>,
    last: u8,
}

impl MilestoneSender {
    fn send(&mut self, milestone: Milestone) {
        if milestone.percent() > self.last {
            self.last = milestone.percent();
            // Receiver gone only means nobody is listening.
            let _ = self.tx.send(milestone);
        }
    }
}

pub struct VideoPipeline {
    config: WorkerConfig,
    analyzer: ContentAnalyzer,
    designer: SceneDesigner,
    workflow: WorkflowExecutor,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl VideoPipeline {
    pub fn new(config: WorkerConfig) -> Self {
        let openai = config.openai.clone().map(OpenAiClient::new);
        let gemini = config.gemini.clone().map(GeminiImageClient::new);
        Self {
            analyzer: ContentAnalyzer::new(openai.clone()),
            designer: SceneDesigner::new(openai),
            workflow: WorkflowExecutor::new(gemini),
            config,
            cancel_rx: None,
        }
    }

    /// Abort running Blender/FFmpeg processes when the receiver flips to `true`.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Directory holding every artifact of one job.
    pub fn output_dir_for(&self, job_id: &JobId, request: &VideoRequest) -> PathBuf {
        self.config
            .output_dir
            .join(format!("{}_{}", request.topic_slug(), job_id))
    }

    pub async fn generate(
        &self,
        job_id: &JobId,
        request: &VideoRequest,
        progress: mpsc::UnboundedSender<Milestone>,
    ) -> WorkerResult<VideoResult> {
        let mut progress = MilestoneSender { tx: progress, last: 0 };
        let output_dir = self.output_dir_for(job_id, request);
        tokio::fs::create_dir_all(&output_dir).await?;

        progress.send(Milestone::Analyzing);
        let analysis = self.analyzer.analyze(request).await;

        let produced = match request.method {
            GenerationMethod::Blender => {
                self.blender_video(request, &analysis, &output_dir, &mut progress)
                    .await
            }
            GenerationMethod::NanoBanana => {
                self.workflow_video(request, &analysis, &output_dir, &mut progress)
                    .await
            }
            GenerationMethod::Hybrid => {
                match self
                    .blender_video(request, &analysis, &output_dir, &mut progress)
                    .await
                {
                    Err(e) if !e.is_cancelled() => {
                        warn!("Blender path failed, trying image workflow: {}", e);
                        self.workflow_video(request, &analysis, &output_dir, &mut progress)
                            .await
                    }
                    other => other,
                }
            }
        };

        match produced {
            Ok((path, method_used)) => Ok(VideoResult {
                video_path: path.to_string_lossy().to_string(),
                method_used,
                fallback: false,
                analysis: Some(analysis),
            }),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!(method = %request.method, "Generation failed, producing fallback: {}", e);
                progress.send(Milestone::Encoding);
                let artifact = create_fallback(
                    &self.ffmpeg(),
                    &output_dir,
                    &request.topic,
                    request.quality,
                    request.duration_secs,
                )
                .await?;
                Ok(VideoResult {
                    video_path: artifact.path().to_string_lossy().to_string(),
                    method_used: request.method,
                    fallback: true,
                    analysis: Some(analysis),
                })
            }
        }
    }

    async fn blender_video(
        &self,
        request: &VideoRequest,
        analysis: &TopicAnalysis,
        output_dir: &Path,
        progress: &mut MilestoneSender,
    ) -> WorkerResult<(PathBuf, GenerationMethod)> {
        // Fail fast before spending a model call on the script.
        self.config.tools.resolve_blender()?;

        progress.send(Milestone::Designing);
        let script = self.designer.design(analysis).await;

        progress.send(Milestone::Rendering);
        let frames_dir = output_dir.join("frames");
        let frame_count = request.duration_secs * RENDER_FPS;
        let blender = self.blender();

        // Frames from an earlier attempt would end up in the encode.
        clear_dir(&frames_dir).await?;
        let render = match blender
            .render(&script.code, &frames_dir, request.quality, frame_count)
            .await
        {
            Err(e) if script.from_model && !matches!(e, MediaError::Cancelled) => {
                warn!("Designed scene failed to render, retrying with built-in scene: {}", e);
                clear_dir(&frames_dir).await?;
                let builtin = SceneScript::builtin();
                blender
                    .render(&builtin.code, &frames_dir, request.quality, frame_count)
                    .await?
            }
            other => other?,
        };

        progress.send(Milestone::Encoding);
        let output = output_dir.join(FINAL_VIDEO_FILE);
        let cmd = FfmpegCommand::encode_frames(render.pattern(), &output, RENDER_FPS, request.quality);
        self.ffmpeg().run(&cmd).await?;

        info!(frames = render.frames.len(), path = %output.display(), "Blender video encoded");
        Ok((output, GenerationMethod::Blender))
    }

    async fn workflow_video(
        &self,
        request: &VideoRequest,
        analysis: &TopicAnalysis,
        output_dir: &Path,
        progress: &mut MilestoneSender,
    ) -> WorkerResult<(PathBuf, GenerationMethod)> {
        if !self.workflow.is_available() {
            return Err(WorkerError::config_error("GOOGLE_API_KEY is not configured"));
        }

        progress.send(Milestone::Designing);
        let workflow = VisualWorkflow::from_analysis(analysis);
        let json = serde_json::to_vec_pretty(&workflow)
            .map_err(|e| WorkerError::job_failed(format!("Failed to serialize workflow: {}", e)))?;
        tokio::fs::write(output_dir.join(WORKFLOW_FILE), json).await?;

        progress.send(Milestone::Rendering);
        let images_dir = output_dir.join("images");
        let images = self.workflow.execute(&workflow, &images_dir).await?;
        if images.is_empty() {
            return Err(WorkerError::job_failed("Visual workflow produced no images"));
        }

        progress.send(Milestone::Encoding);
        let per_image = f64::from(request.duration_secs) / images.len() as f64;
        let list_path = images_dir.join("slideshow.txt");
        tokio::fs::write(&list_path, concat_list(&images, per_image)).await?;

        let output = output_dir.join(FINAL_VIDEO_FILE);
        let cmd = FfmpegCommand::slideshow(&list_path, &output, request.quality);
        self.ffmpeg().run(&cmd).await?;

        info!(images = images.len(), path = %output.display(), "Slideshow video encoded");
        Ok((output, GenerationMethod::NanoBanana))
    }

    fn blender(&self) -> BlenderRunner {
        let runner = BlenderRunner::new(self.config.tools.blender.clone())
            .with_timeout(self.config.blender_timeout.as_secs())
            .with_script_dir(self.config.work_dir.join("scripts"));
        match &self.cancel_rx {
            Some(rx) => runner.with_cancel(rx.clone()),
            None => runner,
        }
    }

    fn ffmpeg(&self) -> FfmpegRunner {
        let runner = FfmpegRunner::new(self.config.tools.ffmpeg.clone())
            .with_timeout(self.config.ffmpeg_timeout.as_secs());
        match &self.cancel_rx {
            Some(rx) => runner.with_cancel(rx.clone()),
            None => runner,
        }
    }
}

async fn clear_dir(dir: &Path) -> WorkerResult<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
