//! OpenAI-compatible generation backend.
//!
//! Supports OpenAI, Ollama, vLLM, LM Studio, and any endpoint that follows
//! the OpenAI chat completions API format.

use super::{GenerationRequest, Generator, build_http_client, map_transport_error, resolve_api_key};
use crate::config::GenerationConfig;
use crate::error::GenerationError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// System message sent ahead of every prompt.
const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that answers questions using only the documents provided.";

/// OpenAI-compatible chat completions backend.
pub struct OpenAiCompatibleGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl OpenAiCompatibleGenerator {
    /// Create a new backend from configuration.
    ///
    /// Local servers (the `ollama`/`local` providers, or any localhost base URL)
    /// need no API key; hosted ones fail with `AuthFailed` when none is set.
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let base_url = config.base_url.clone().unwrap_or_else(|| {
            match config.provider.as_str() {
                "ollama" | "local" => OLLAMA_BASE_URL,
                _ => OPENAI_BASE_URL,
            }
            .to_string()
        });
        let is_local = base_url.contains("localhost") || base_url.contains("127.0.0.1");

        let api_key = resolve_api_key(config)
            .or_else(|| {
                if is_local {
                    debug!("No API key set for local provider; using dummy bearer token");
                    Some("ollama".to_string())
                } else {
                    None
                }
            })
            .ok_or_else(|| GenerationError::AuthFailed {
                provider: format!(
                    "OpenAI-compatible: env var '{}' not set",
                    config.api_key_env
                ),
            })?;

        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn build_request_body(&self, request: &GenerationRequest) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": request.prompt},
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "n": 1,
        })
    }

    /// Extract `choices[0].message.content`.
    fn parse_response(body: &Value) -> Result<String, GenerationError> {
        let choice = body["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| GenerationError::ResponseParse {
                message: "No choices in response".to_string(),
            })?;

        let content = choice["message"]["content"].as_str().ok_or_else(|| {
            GenerationError::ResponseParse {
                message: "Choice has no text content".to_string(),
            }
        })?;

        if content.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(content.to_string())
    }

    /// Map HTTP error status codes to typed errors.
    fn map_http_error(status: reqwest::StatusCode, body: &str) -> GenerationError {
        match status.as_u16() {
            401 | 403 => {
                debug!(body = %body, "Authentication failed");
                GenerationError::AuthFailed {
                    provider: "OpenAI-compatible".to_string(),
                }
            }
            429 => {
                // "Rate limit reached ... Please try again in 20s."
                let retry_secs = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| v["error"]["message"].as_str().map(|s| s.to_string()))
                    .and_then(|msg| {
                        msg.split("in ")
                            .last()
                            .and_then(|s| s.trim_end_matches('.').trim_end_matches('s').parse::<u64>().ok())
                    })
                    .unwrap_or(5);
                GenerationError::RateLimited {
                    retry_after_secs: retry_secs,
                }
            }
            status if status >= 500 => GenerationError::Connection {
                message: format!("Server error ({}): {}", status, body),
            },
            _ => GenerationError::ApiRequest {
                message: format!("HTTP {}: {}", status, body),
            },
        }
    }
}

#[async_trait]
impl Generator for OpenAiCompatibleGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request_body(request);

        debug!(
            model = self.model.as_str(),
            url = url.as_str(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, "OpenAI-compatible API", self.timeout_secs))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| GenerationError::ResponseParse {
                message: format!("Failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| GenerationError::ResponseParse {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        Self::parse_response(&response_json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
