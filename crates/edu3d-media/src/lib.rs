//! External tool glue for video generation.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building (frame encode, slideshow, placeholder)
//! - Headless Blender rendering with timeout and cancellation
//! - Availability probes for Blender and FFmpeg
//! - Free disk space checks
//! - Placeholder video / HTML preview fallback

pub mod blender;
pub mod command;
pub mod disk;
pub mod error;
pub mod fallback;
pub mod toolcheck;
pub mod tools;

pub use blender::{BlenderRunner, RenderOutput, DEFAULT_SCENE_SCRIPT};
pub use command::{concat_list, FfmpegCommand, FfmpegRunner};
pub use disk::{free_space, DiskSpace};
pub use error::{MediaError, MediaResult};
pub use fallback::{create_fallback, FallbackArtifact};
pub use toolcheck::{probe_blender, probe_ffmpeg, ToolProbe};
pub use tools::ToolPaths;
