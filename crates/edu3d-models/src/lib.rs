//! Shared data models for the Edu3D video service.
//!
//! This crate provides Serde-serializable types for:
//! - Video generation requests and their enumerations
//! - Job records and the queue payload
//! - Topic analysis and the visual workflow graph
//! - The built-in example catalog

pub mod analysis;
pub mod catalog;
pub mod job;
pub mod request;
pub mod workflow;

// Re-export common types
pub use analysis::{Concept, TopicAnalysis};
pub use catalog::{example, examples_for_subject, list_all_topics, ExampleTopic, SubjectTopics};
pub use job::{JobId, JobRecord, JobStatus, TransitionError, VideoJob, VideoResult};
pub use request::{
    GenerationMethod, Language, Level, ParseEnumError, Subject, VideoQuality, VideoRequest,
    DEFAULT_DURATION_SECS, MAX_DURATION_SECS, MIN_DURATION_SECS,
};
pub use workflow::{NodeKind, Position, VisualWorkflow, WorkflowEdge, WorkflowError, WorkflowNode};
