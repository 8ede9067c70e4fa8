//! Generation backend implementations.
//!
//! Provides concrete implementations of the `Generator` trait for:
//! - Google Gemini API (default)
//! - OpenAI-compatible APIs (OpenAI, Ollama, vLLM, LM Studio)
//! - A scripted mock for tests and offline demos
//!
//! Use `create_generator()` to instantiate the appropriate backend from config.

pub mod gemini;
pub mod mock;
pub mod openai_compat;

use crate::config::{GenerationConfig, RetryConfig};
use crate::error::GenerationError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use gemini::GeminiGenerator;
pub use mock::MockGenerator;
pub use openai_compat::OpenAiCompatibleGenerator;

/// A single prompt-in, text-out generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// External text-generation capability.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for `request.prompt`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// The model identifier, for logging and status output.
    fn model_name(&self) -> &str;
}

/// Execute an async operation with exponential backoff retry on transient errors.
///
/// Retries on `RateLimited` (respects `retry_after_secs`), `Timeout`,
/// `Connection` and `EmptyResponse`. Permanent errors (auth, parse, HTTP 4xx)
/// return immediately. The operation is re-run with unchanged input.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, GenerationError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !is_retryable(&e) || attempt >= config.max_retries {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(config, attempt, &e);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying generation after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

/// Check if an error is retryable (transient).
pub fn is_retryable(err: &GenerationError) -> bool {
    matches!(
        err,
        GenerationError::RateLimited { .. }
            | GenerationError::Timeout { .. }
            | GenerationError::Connection { .. }
            | GenerationError::EmptyResponse
    )
}

/// Compute backoff delay, respecting rate limit retry-after hints.
fn compute_backoff(config: &RetryConfig, attempt: u32, err: &GenerationError) -> u64 {
    let computed = compute_exponential_backoff(config, attempt);
    if let GenerationError::RateLimited { retry_after_secs } = err {
        return (retry_after_secs * 1000).max(computed).min(config.max_backoff_ms.max(computed));
    }
    computed
}

/// Pure exponential backoff with optional jitter.
fn compute_exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    if config.jitter {
        // Add up to 25% jitter
        let jitter = (capped as f64 * 0.25 * rand_simple()) as u64;
        capped + jitter
    } else {
        capped
    }
}

/// Cheap pseudo-random value in `[0, 1)` for jitter.
fn rand_simple() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// Classify a `reqwest` transport failure.
pub(crate) fn map_transport_error(
    err: reqwest::Error,
    backend: &str,
    timeout_secs: u64,
) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout { timeout_secs }
    } else if err.is_connect() {
        GenerationError::Connection {
            message: format!("{} unreachable: {}", backend, err),
        }
    } else {
        GenerationError::ApiRequest {
            message: format!("Request to {} failed: {}", backend, err),
        }
    }
}

pub(crate) fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client, GenerationError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| GenerationError::Connection {
            message: format!("Failed to build HTTP client: {}", e),
        })
}

/// Resolve the API key from the config or the environment variable it names.
pub fn resolve_api_key(config: &GenerationConfig) -> Option<String> {
    config
        .api_key
        .clone()
        .or_else(|| std::env::var(&config.api_key_env).ok())
        .filter(|k| !k.trim().is_empty())
}

/// Create a generation backend based on the configuration.
///
/// Routes to the appropriate implementation:
/// - `"gemini"` → `GeminiGenerator`
/// - `"openai"`, `"ollama"`, `"local"` → `OpenAiCompatibleGenerator`
///
/// Returns `AuthFailed` if a hosted backend has no API key.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>, GenerationError> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        "openai" | "ollama" | "local" => Ok(Arc::new(OpenAiCompatibleGenerator::new(config)?)),
        other => Err(GenerationError::ApiRequest {
            message: format!("Unknown generation provider '{}'", other),
        }),
    }
}
