//! Content analyzer stage.
//!
//! Breaks a topic down into visual concepts. Without an OpenAI key, or when
//! the model call or its JSON fails, a single-concept baseline is used so
//! the pipeline can always continue.

use tracing::{info, warn};

use edu3d_models::{TopicAnalysis, VideoRequest};

use crate::error::{WorkerError, WorkerResult};
use crate::openai::{strip_code_fences, OpenAiClient};

const SYSTEM_PROMPT: &str = "You are an expert educational content designer. \
Analyze the given topic and break it down into visual concepts that can be \
represented in 3D animations and educational visuals. Respond with a single JSON object.";

pub struct ContentAnalyzer {
    client: Option<OpenAiClient>,
}

impl ContentAnalyzer {
    pub fn new(client: Option<OpenAiClient>) -> Self {
        Self { client }
    }

    /// Topic analysis for `request`; never fails.
    pub async fn analyze(&self, request: &VideoRequest) -> TopicAnalysis {
        let baseline =
            || TopicAnalysis::baseline(&request.topic, request.subject, request.level);

        let Some(client) = &self.client else {
            info!("No OpenAI client configured, using baseline analysis");
            return baseline();
        };

        match self.analyze_with_model(client, request).await {
            Ok(analysis) => {
                info!(concepts = analysis.concepts.len(), "Topic analysis complete");
                analysis
            }
            Err(e) => {
                warn!("Topic analysis failed, using baseline: {}", e);
                baseline()
            }
        }
    }

    async fn analyze_with_model(
        &self,
        client: &OpenAiClient,
        request: &VideoRequest,
    ) -> WorkerResult<TopicAnalysis> {
        let raw = client
            .chat(SYSTEM_PROMPT, &build_prompt(request), true)
            .await?;
        parse_analysis(&raw, request)
    }
}

fn build_prompt(request: &VideoRequest) -> String {
    format!(
        r#"Topic: {topic}
Subject: {subject}
Level: {level}
Language: {language}
Target duration: {duration} seconds

Return a JSON object with this schema:
{{
  "concepts": [
    {{
      "name": "Concept name",
      "description": "Detailed description",
      "image_prompt": "Prompt for generating an educational illustration",
      "3d_objects": ["object1", "object2"],
      "animations": ["animation1", "animation2"],
      "camera_angles": ["angle1", "angle2"],
      "annotations": ["annotation1", "annotation2"]
    }}
  ],
  "workflow_steps": ["step1", "step2"],
  "animation_frames": 3,
  "estimated_duration": {duration}
}}

Use 2 to 5 concepts appropriate for {level} students."#,
        topic = request.topic,
        subject = request.subject,
        level = request.level,
        language = request.language,
        duration = request.duration_secs,
    )
}

/// Parse a model response into an analysis tied to `request`.
pub fn parse_analysis(raw: &str, request: &VideoRequest) -> WorkerResult<TopicAnalysis> {
    let mut value: serde_json::Value = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| WorkerError::ai_failed(format!("Analysis is not valid JSON: {}", e)))?;

    // Topic, subject and level come from the request, not the model.
    let obj = value
        .as_object_mut()
        .ok_or_else(|| WorkerError::ai_failed("Analysis is not a JSON object"))?;
    obj.insert("topic".into(), request.topic.clone().into());
    obj.insert("subject".into(), serde_json::to_value(request.subject).unwrap_or_default());
    obj.insert("level".into(), serde_json::to_value(request.level).unwrap_or_default());

    let analysis: TopicAnalysis = serde_json::from_value(value)
        .map_err(|e| WorkerError::ai_failed(format!("Analysis has unexpected shape: {}", e)))?;
    Ok(analysis.normalized())
}
