//! Video generation worker.
//!
//! This crate provides:
//! - Job executor with bounded concurrency, retry and DLQ handling
//! - Content analysis and scene design through OpenAI
//! - Visual workflow execution through Gemini image generation
//! - Blender / slideshow / fallback video generation
//! - Progress emission and graceful shutdown

pub mod analyzer;
pub mod config;
pub mod error;
pub mod executor;
pub mod gemini;
pub mod logging;
pub mod metrics;
pub mod openai;
pub mod pipeline;
pub mod retry;
pub mod scene_designer;
pub mod visual_workflow;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use pipeline::VideoPipeline;
