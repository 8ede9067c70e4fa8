//! Google Gemini API generation backend.
//!
//! Key differences from OpenAI-compatible APIs:
//! - Auth via `?key=API_KEY` query parameter (not header-based)
//! - Prompts are sent as `contents[].parts[].text` with role `"user"`
//! - Sampling settings live under `generationConfig`

use super::{GenerationRequest, Generator, build_http_client, map_transport_error, resolve_api_key};
use crate::config::GenerationConfig;
use crate::error::GenerationError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

/// The default Google Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini generation backend.
pub struct GeminiGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl GeminiGenerator {
    /// Create a new Gemini backend from configuration.
    ///
    /// Reads the API key from `config.api_key` or the environment variable named
    /// by `config.api_key_env`. Returns `AuthFailed` if neither is set.
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key = resolve_api_key(config).ok_or_else(|| GenerationError::AuthFailed {
            provider: format!("Gemini (env var '{}' not set)", config.api_key_env),
        })?;
        Self::new_with_key(config, api_key)
    }

    /// Create a new Gemini backend with an explicitly provided API key.
    pub fn new_with_key(config: &GenerationConfig, api_key: String) -> Result<Self, GenerationError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Build the JSON request body for the Gemini API.
    fn build_request_body(request: &GenerationRequest) -> Value {
        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": request.prompt}],
            }],
            "generationConfig": {
                "maxOutputTokens": request.max_tokens,
                "temperature": request.temperature,
                "candidateCount": 1,
            },
        })
    }

    /// Extract the answer text from a `generateContent` response.
    ///
    /// Concatenates the text parts of the first candidate. A candidate with no
    /// text (for example one blocked by safety filters) is a parse error; an
    /// all-whitespace answer is `EmptyResponse`.
    fn parse_response(body: &Value) -> Result<String, GenerationError> {
        let candidate = body["candidates"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| {
                let reason = body["promptFeedback"]["blockReason"]
                    .as_str()
                    .unwrap_or("no candidates");
                GenerationError::ResponseParse {
                    message: format!("Gemini returned no candidates ({})", reason),
                }
            })?;

        let parts = candidate["content"]["parts"].as_array().ok_or_else(|| {
            let reason = candidate["finishReason"].as_str().unwrap_or("unknown");
            GenerationError::ResponseParse {
                message: format!("Gemini candidate has no content (finishReason: {})", reason),
            }
        })?;

        let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }

    /// Map HTTP error status codes to typed errors.
    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> GenerationError {
        match status.as_u16() {
            401 | 403 => GenerationError::AuthFailed {
                provider: "Gemini".to_string(),
            },
            429 => GenerationError::RateLimited {
                retry_after_secs: 30,
            },
            s if s >= 500 => GenerationError::Connection {
                message: format!("Gemini API server error {}: {}", status, body_text),
            },
            _ => GenerationError::ApiRequest {
                message: format!("HTTP {} from Gemini API: {}", status, body_text),
            },
        }
    }

    fn endpoint_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = Self::build_request_body(request);

        debug!(
            model = self.model.as_str(),
            prompt_chars = request.prompt.len(),
            "Sending Gemini generateContent request"
        );

        let response = self
            .client
            .post(self.endpoint_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, "Gemini API", self.timeout_secs))?;

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

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GenerationConfig {
        GenerationConfig {
            model: "gemini-2.5-flash".to_string(),
            api_key_env: "LIBPALTEST_GEMINI_UNUSED".to_string(),
            base_url: Some("https://example.test/v1beta/".to_string()),
            ..Default::default()
        }
    }

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }

    #[test]
    fn test_new_with_explicit_key() {
        let mut config = test_config();
        config.api_key = Some("key-123".into());
        let generator = GeminiGenerator::new(&config).unwrap();
        assert_eq!(generator.model_name(), "gemini-2.5-flash");
    }

    #[test]
    fn test_new_without_key_fails() {
        let err = GeminiGenerator::new(&test_config()).err().unwrap();
        match err {
            GenerationError::AuthFailed { provider } => {
                assert!(provider.contains("LIBPALTEST_GEMINI_UNUSED"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_endpoint_url_trims_trailing_slash() {
        let generator = GeminiGenerator::new_with_key(&test_config(), "abc".into()).unwrap();
        assert_eq!(
            generator.endpoint_url(),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent?key=abc"
        );
    }

    #[test]
    fn test_build_request_body() {
        let body = GeminiGenerator::build_request_body(&request("What is RAG?"));
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "What is RAG?");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1000);
        assert_eq!(body["generationConfig"]["candidateCount"], 1);
    }

    #[test]
    fn test_parse_response_joins_parts() {
        let body = serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "Hello, "}, {"text": "world."}], "role": "model"},
                "finishReason": "STOP"
            }]
        });
        assert_eq!(
            GeminiGenerator::parse_response(&body).unwrap(),
            "Hello, world."
        );
    }

    #[test]
    fn test_parse_response_blocked_prompt() {
        let body = serde_json::json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        });
        let err = GeminiGenerator::parse_response(&body).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_parse_response_candidate_without_content() {
        let body = serde_json::json!({
            "candidates": [{"finishReason": "MAX_TOKENS"}]
        });
        let err = GeminiGenerator::parse_response(&body).unwrap_err();
        assert!(matches!(err, GenerationError::ResponseParse { .. }));
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn test_parse_response_whitespace_is_empty() {
        let body = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "  \n"}]}}]
        });
        assert!(matches!(
            GeminiGenerator::parse_response(&body),
            Err(GenerationError::EmptyResponse)
        ));
    }

    #[test]
    fn test_map_http_error() {
        use reqwest::StatusCode;
        assert!(matches!(
            GeminiGenerator::map_http_error(StatusCode::FORBIDDEN, ""),
            GenerationError::AuthFailed { .. }
        ));
        assert!(matches!(
            GeminiGenerator::map_http_error(StatusCode::TOO_MANY_REQUESTS, ""),
            GenerationError::RateLimited {
                retry_after_secs: 30
            }
        ));
        assert!(matches!(
            GeminiGenerator::map_http_error(StatusCode::SERVICE_UNAVAILABLE, "busy"),
            GenerationError::Connection { .. }
        ));
        let err = GeminiGenerator::map_http_error(StatusCode::BAD_REQUEST, "bad model");
        assert!(err.to_string().contains("bad model"));
        assert!(!crate::providers::is_retryable(&err));
    }

    #[test]
    fn test_server_errors_are_retryable() {
        use reqwest::StatusCode;
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::GATEWAY_TIMEOUT,
        ] {
            let err = GeminiGenerator::map_http_error(status, "oops");
            assert!(
                matches!(err, GenerationError::Connection { .. }),
                "{status} mapped to {err:?}"
            );
            assert!(crate::providers::is_retryable(&err));
        }
    }
}
