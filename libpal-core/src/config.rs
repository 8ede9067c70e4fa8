//! Configuration system for libpal.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/libpal/config.toml` and/or `.libpal/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::embeddings::known_model_dimensions;
use crate::error::{ChunkError, ConfigError, LibpalError};

/// Providers the embedding factory knows how to build.
pub const EMBEDDING_PROVIDERS: &[&str] = &["local", "ollama", "openai"];

/// Providers the generation factory knows how to build.
pub const GENERATION_PROVIDERS: &[&str] = &["gemini", "openai", "ollama", "local"];

/// Top-level configuration for a libpal session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibpalConfig {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Fixed-window chunking parameters, measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

/// Embedding backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "local" (default), "ollama", "openai".
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Provider-specific model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Vector dimension D. The local embedder always uses it. Remote backends
    /// use the model's known dimension and fall back to this for other models.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Optional base URL override for remote backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key (OpenAI backend only).
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,
    /// Texts per embedding request during index builds.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_embedding_provider() -> String {
    "local".into()
}

fn default_dimensions() -> usize {
    384
}

fn default_embedding_key_env() -> String {
    "OPENAI_API_KEY".into()
}

fn default_batch_size() -> usize {
    32
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dimensions: default_dimensions(),
            base_url: None,
            api_key_env: default_embedding_key_env(),
            batch_size: default_batch_size(),
        }
    }
}

/// Retrieval parameters applied to every question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of nearest chunks requested from the index.
    pub top_k: usize,
    /// Upper bound on the summed character length of included chunks.
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            max_context_chars: 4000,
        }
    }
}

/// Generation backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Provider name: "gemini" (default), "openai", "ollama", "local".
    pub provider: String,
    /// Model identifier (e.g., "gemini-2.5-flash", "gpt-4o-mini").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// API key supplied directly, bypassing the environment. Never serialized.
    #[serde(skip)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,
    /// Per-request HTTP timeout.
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.7,
            max_tokens: 1000,
            timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

/// Backoff policy for transient generation failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt. At most 1.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Conversation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Number of most recent turns replayed into each prompt. 0 disables history.
    pub history_turns: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { history_turns: 5 }
    }
}

impl LibpalConfig {
    /// Reject configurations that cannot produce a working session.
    ///
    /// Chunking problems surface as `ChunkError::InvalidConfig`; everything
    /// else as `ConfigError::Invalid`.
    pub fn validate(&self) -> Result<(), LibpalError> {
        let ChunkingConfig {
            chunk_size,
            overlap,
        } = self.chunking;
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(ChunkError::InvalidConfig {
                chunk_size,
                overlap,
            }
            .into());
        }

        let invalid = |message: String| -> LibpalError { ConfigError::Invalid { message }.into() };

        if self.retrieval.top_k == 0 {
            return Err(invalid("retrieval.top_k must be at least 1".into()));
        }
        if self.retrieval.max_context_chars == 0 {
            return Err(invalid(
                "retrieval.max_context_chars must be at least 1".into(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(invalid("embedding.batch_size must be at least 1".into()));
        }
        if self.embedding.dimensions == 0
            && known_model_dimensions(&self.embedding.provider, self.embedding.model.as_deref())
                .is_none()
        {
            return Err(invalid(format!(
                "embedding.dimensions must be set for {} model '{}'",
                self.embedding.provider,
                self.embedding.model.as_deref().unwrap_or("default")
            )));
        }
        if !EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            return Err(invalid(format!(
                "unknown embedding provider '{}' (expected one of: {})",
                self.embedding.provider,
                EMBEDDING_PROVIDERS.join(", ")
            )));
        }
        if !GENERATION_PROVIDERS.contains(&self.generation.provider.as_str()) {
            return Err(invalid(format!(
                "unknown generation provider '{}' (expected one of: {})",
                self.generation.provider,
                GENERATION_PROVIDERS.join(", ")
            )));
        }
        if self.generation.retry.max_retries > 1 {
            return Err(invalid(format!(
                "generation.retry.max_retries is {}; at most one retry is allowed",
                self.generation.retry.max_retries
            )));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(invalid(format!(
                "generation.temperature {} is outside 0.0..=2.0",
                self.generation.temperature
            )));
        }
        if self.generation.max_tokens == 0 {
            return Err(invalid("generation.max_tokens must be at least 1".into()));
        }
        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }
}

/// Load configuration from all sources with layered merging.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `LIBPAL_`)
/// 3. Workspace-local config (`.libpal/config.toml`)
/// 4. User config (`~/.config/libpal/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&LibpalConfig>,
) -> Result<LibpalConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(LibpalConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // LIBPAL_GENERATION__MODEL, LIBPAL_RETRIEVAL__TOP_K, etc.
    figment = figment.merge(Env::prefixed("LIBPAL_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Location of the user-level config file, if a home directory can be resolved.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "libpal", "libpal")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Location of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".libpal").join("config.toml")
}
