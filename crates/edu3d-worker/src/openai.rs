//! OpenAI chat completions client.
//!
//! Backs the content analyzer and scene designer stages.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::OpenAiConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::retry::{retry_async, RetryConfig};

/// OpenAI API client.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
    retry: RetryConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Failed attempt, tagged with whether another attempt can help.
struct CallError {
    retryable: bool,
    error: WorkerError,
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.error, f)
    }
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            retry: RetryConfig::new("openai chat"),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send a system + user prompt and return the assistant message text.
    ///
    /// With `json_mode` the model is asked for a single JSON object.
    pub async fn chat(&self, system: &str, user: &str, json_mode: bool) -> WorkerResult<String> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.7,
            response_format: json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        debug!(model = %self.config.model, json_mode, "Calling OpenAI chat completions");
        let content = retry_async(&self.retry, |e: &CallError| e.retryable, || {
            self.send(&url, &request)
        })
        .await
        .map_err(|e| e.error)?;

        info!(model = %self.config.model, chars = content.len(), "OpenAI response received");
        Ok(content)
    }

    async fn send(&self, url: &str, request: &ChatRequest<'_>) -> Result<String, CallError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| CallError {
                retryable: true,
                error: WorkerError::ai_failed(format!("OpenAI request failed: {}", e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CallError {
                retryable: status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
                error: WorkerError::ai_failed(format!(
                    "OpenAI API returned {}: {}",
                    status, error_text
                )),
            });
        }

        let body: ChatResponse = response.json().await.map_err(|e| CallError {
            retryable: false,
            error: WorkerError::ai_failed(format!("Failed to parse OpenAI response: {}", e)),
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CallError {
                retryable: false,
                error: WorkerError::ai_failed("No content in OpenAI response"),
            })
    }
}

/// Strip a surrounding markdown code fence (```json / ```python / ```).
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
