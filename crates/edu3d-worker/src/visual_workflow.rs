//! Visual workflow execution.
//!
//! Runs the nodes of a [`VisualWorkflow`] in dependency order through
//! Gemini. Generate nodes render from their prompt; edit nodes take the
//! image of their upstream node. Every node's image is written to disk and
//! the images of sink nodes (those nothing depends on) form the slideshow.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use edu3d_models::{NodeKind, VisualWorkflow};

use crate::error::{WorkerError, WorkerResult};
use crate::gemini::GeminiImageClient;

pub struct WorkflowExecutor {
    client: Option<GeminiImageClient>,
}

impl WorkflowExecutor {
    pub fn new(client: Option<GeminiImageClient>) -> Self {
        Self { client }
    }

    pub fn is_available(&self) -> bool {
        self.client.is_some()
    }

    /// Execute `workflow`, writing images into `images_dir`.
    ///
    /// Returns the sink-node images in execution order.
    pub async fn execute(
        &self,
        workflow: &VisualWorkflow,
        images_dir: &Path,
    ) -> WorkerResult<Vec<PathBuf>> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| WorkerError::config_error("GOOGLE_API_KEY is not configured"))?;

        let order = workflow.execution_order()?;
        tokio::fs::create_dir_all(images_dir).await?;

        let sources: HashSet<&str> = workflow.edges.iter().map(|e| e.source.as_str()).collect();
        let mut images: HashMap<&str, Vec<u8>> = HashMap::with_capacity(order.len());
        let mut outputs = Vec::new();

        info!(workflow = %workflow.name, nodes = order.len(), "Executing visual workflow");

        for (idx, node) in order.iter().enumerate() {
            let bytes = match node.kind {
                NodeKind::GenerateImage => client.generate_image(&node.prompt).await?,
                NodeKind::EditImage => {
                    let upstream = workflow
                        .upstream_of(&node.id)
                        .and_then(|id| images.get(id))
                        .ok_or_else(|| {
                            WorkerError::invalid_job(format!(
                                "Edit node '{}' has no upstream image",
                                node.id
                            ))
                        })?;
                    client.edit_image(&node.prompt, upstream).await?
                }
            };

            let path = images_dir.join(format!("{:04}_{}.png", idx, node.id));
            tokio::fs::write(&path, &bytes).await?;
            debug!(node = %node.id, path = %path.display(), "Workflow node complete");

            if !sources.contains(node.id.as_str()) {
                outputs.push(path);
            }
            images.insert(node.id.as_str(), bytes);
        }

        info!(images = outputs.len(), "Visual workflow complete");
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeminiConfig;
    use crate::retry::RetryConfig;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use edu3d_models::{Level, Subject, TopicAnalysis};
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn image_response(bytes: &[u8]) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{"content": {"parts": [
                {"inlineData": {"mimeType": "image/png", "data": BASE64.encode(bytes)}}
            ]}}]
        }))
    }

    #[tokio::test]
    async fn test_without_client_is_config_error() {
        let analysis = TopicAnalysis::baseline("Atoms", Subject::Chemistry, Level::College);
        let workflow = VisualWorkflow::from_analysis(&analysis);
        let dir = tempfile::tempdir().unwrap();

        let err = WorkflowExecutor::new(None)
            .execute(&workflow, dir.path())
            .await
            .unwrap_err();
        assert!(err.is_permanent_failure());
    }

    #[tokio::test]
    async fn test_executes_nodes_and_returns_sinks() {
        let server = MockServer::start().await;
        // Edit requests carry the upstream image inline.
        Mock::given(method("POST"))
            .and(body_string_contains("inlineData"))
            .respond_with(image_response(b"annotated"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(image_response(b"generated"))
            .mount(&server)
            .await;

        let client = GeminiImageClient::new(GeminiConfig {
            api_key: "k".into(),
            base_url: server.uri(),
            image_models: vec!["img".into()],
        })
        .with_retry(RetryConfig::new("test").with_max_retries(0));

        let analysis = TopicAnalysis::baseline("Atoms", Subject::Chemistry, Level::College);
        let workflow = VisualWorkflow::from_analysis(&analysis);
        let dir = tempfile::tempdir().unwrap();

        let outputs = WorkflowExecutor::new(Some(client))
            .execute(&workflow, dir.path())
            .await
            .unwrap();

        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].ends_with("0001_annotate_0.png"));
        assert_eq!(std::fs::read(&outputs[0]).unwrap(), b"annotated");
        assert_eq!(
            std::fs::read(dir.path().join("0000_concept_0.png")).unwrap(),
            b"generated"
        );
    }
}
