//! Gemini image generation client.
//!
//! Executes the image nodes of a visual workflow. Generation sends a text
//! prompt; editing sends the upstream image inline along with the prompt.
//! Models are tried in order until one returns an image.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::GeminiConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::retry::{retry_async, RetryConfig};

/// Gemini API client.
#[derive(Clone)]
pub struct GeminiImageClient {
    client: Client,
    config: GeminiConfig,
    retry: RetryConfig,
}

/// Gemini API request.
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseModalities")]
    response_modalities: Vec<&'static str>,
}

/// Gemini API response.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

struct CallError {
    retryable: bool,
    error: WorkerError,
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.error, f)
    }
}

impl GeminiImageClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            retry: RetryConfig::new("gemini image"),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Generate a PNG/JPEG image from a text prompt.
    pub async fn generate_image(&self, prompt: &str) -> WorkerResult<Vec<u8>> {
        self.request_image(vec![Part::Text {
            text: prompt.to_string(),
        }])
        .await
    }

    /// Edit `image` according to `prompt`.
    pub async fn edit_image(&self, prompt: &str, image: &[u8]) -> WorkerResult<Vec<u8>> {
        self.request_image(vec![
            Part::Text {
                text: prompt.to_string(),
            },
            Part::Image {
                inline_data: InlineData {
                    mime_type: sniff_mime(image).to_string(),
                    data: BASE64.encode(image),
                },
            },
        ])
        .await
    }

    async fn request_image(&self, parts: Vec<Part>) -> WorkerResult<Vec<u8>> {
        let request = GeminiRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_modalities: vec!["TEXT", "IMAGE"],
            },
        };

        let mut last_error = None;
        for model in &self.config.image_models {
            info!("Attempting Gemini image generation with model: {}", model);
            let result = retry_async(&self.retry, |e: &CallError| e.retryable, || {
                self.call_model(model, &request)
            })
            .await;

            match result {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    warn!("Failed with model {}: {}", model, e);
                    last_error = Some(e.error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| WorkerError::ai_failed("No Gemini image model configured")))
    }

    async fn call_model(&self, model: &str, request: &GeminiRequest) -> Result<Vec<u8>, CallError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| CallError {
                retryable: true,
                error: WorkerError::ai_failed(format!("Gemini API request failed: {}", e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CallError {
                retryable: status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
                error: WorkerError::ai_failed(format!(
                    "Gemini API returned {}: {}",
                    status, error_text
                )),
            });
        }

        let body: GeminiResponse = response.json().await.map_err(|e| CallError {
            retryable: false,
            error: WorkerError::ai_failed(format!("Failed to parse Gemini response: {}", e)),
        })?;

        let data = body
            .candidates
            .into_iter()
            .flat_map(|c| c.content.parts)
            .find_map(|p| p.inline_data)
            .ok_or_else(|| CallError {
                retryable: false,
                error: WorkerError::ai_failed("No image in Gemini response"),
            })?;

        BASE64.decode(data.data.as_bytes()).map_err(|e| CallError {
            retryable: false,
            error: WorkerError::ai_failed(format!("Invalid image payload: {}", e)),
        })
    }
}

fn sniff_mime(image: &[u8]) -> &'static str {
    if image.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else {
        "image/png"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, models: &[&str]) -> GeminiImageClient {
        GeminiImageClient::new(GeminiConfig {
            api_key: "g-test".into(),
            base_url: server.uri(),
            image_models: models.iter().map(|m| m.to_string()).collect(),
        })
        .with_retry(
            RetryConfig::new("test")
                .with_max_retries(0)
                .with_base_delay(Duration::from_millis(1)),
        )
    }

    fn image_response(bytes: &[u8]) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "Here is your image"},
                    {"inlineData": {"mimeType": "image/png", "data": BASE64.encode(bytes)}}
                ]}
            }]
        }))
    }

    #[tokio::test]
    async fn test_generate_image_decodes_inline_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/img-a:generateContent"))
            .and(header("x-goog-api-key", "g-test"))
            .respond_with(image_response(b"\x89PNGdata"))
            .mount(&server)
            .await;

        let bytes = client_for(&server, &["img-a"])
            .generate_image("a red cell")
            .await
            .unwrap();
        assert_eq!(bytes, b"\x89PNGdata");
    }

    #[tokio::test]
    async fn test_falls_back_to_next_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/img-a:generateContent"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/img-b:generateContent"))
            .respond_with(image_response(b"second"))
            .mount(&server)
            .await;

        let bytes = client_for(&server, &["img-a", "img-b"])
            .generate_image("prompt")
            .await
            .unwrap();
        assert_eq!(bytes, b"second");
    }

    #[tokio::test]
    async fn test_edit_sends_upstream_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{"parts": [
                    {"text": "annotate"},
                    {"inlineData": {"mimeType": "image/png", "data": BASE64.encode(b"upstream")}}
                ]}]
            })))
            .respond_with(image_response(b"edited"))
            .expect(1)
            .mount(&server)
            .await;

        let bytes = client_for(&server, &["img-a"])
            .edit_image("annotate", b"upstream")
            .await
            .unwrap();
        assert_eq!(bytes, b"edited");
    }

    #[tokio::test]
    async fn test_text_only_response_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "no image"}]}}]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, &["img-a"])
            .generate_image("prompt")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No image"));
    }
}
