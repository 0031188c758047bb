//! Topic analysis produced by the content analyzer stage.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Level, Subject};

/// A single concept to visualize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Concept {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Prompt for the image generation step
    #[serde(default)]
    pub image_prompt: String,
    #[serde(default, alias = "3d_objects")]
    pub objects_3d: Vec<String>,
    #[serde(default)]
    pub animations: Vec<String>,
    #[serde(default)]
    pub camera_angles: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<String>,
}

/// Visualization plan for a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TopicAnalysis {
    pub topic: String,
    pub subject: Subject,
    pub level: Level,
    pub concepts: Vec<Concept>,
    #[serde(default)]
    pub workflow_steps: Vec<String>,
    #[serde(default)]
    pub animation_frames: u32,
    /// Estimated duration in seconds
    #[serde(default)]
    pub estimated_duration: u32,
}

impl TopicAnalysis {
    /// Single-concept analysis used when no language model is available.
    pub fn baseline(topic: &str, subject: Subject, level: Level) -> Self {
        let concept = Concept {
            name: "Main Concept".to_string(),
            description: format!("Visual representation of {topic}"),
            image_prompt: format!(
                "Create a 3D educational illustration of {topic} suitable for {level} students"
            ),
            objects_3d: strings(&["Sphere", "Cube", "Cylinder"]),
            animations: strings(&["Rotation", "Scale", "Movement"]),
            camera_angles: strings(&["Front", "Side", "Top"]),
            annotations: strings(&["Key terms", "Important relationships", "Process steps"]),
        };

        Self {
            topic: topic.to_string(),
            subject,
            level,
            concepts: vec![concept],
            workflow_steps: strings(&[
                "Generate main concept visualization",
                "Add educational annotations",
                "Create animation frames",
                "Combine into educational sequence",
            ]),
            animation_frames: 3,
            estimated_duration: 120,
        }
    }

    /// Fill gaps left by a model response so downstream stages never see empty prompts.
    pub fn normalized(mut self) -> Self {
        if self.concepts.is_empty() {
            let base = Self::baseline(&self.topic, self.subject, self.level);
            self.concepts = base.concepts;
        }
        for concept in &mut self.concepts {
            if concept.image_prompt.trim().is_empty() {
                concept.image_prompt = format!(
                    "Create a 3D educational illustration of {} ({}) suitable for {} students",
                    concept.name, self.topic, self.level
                );
            }
            if concept.annotations.is_empty() {
                concept.annotations = vec!["Key terms".to_string()];
            }
        }
        if self.animation_frames == 0 {
            self.animation_frames = self.concepts.len() as u32;
        }
        self
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
