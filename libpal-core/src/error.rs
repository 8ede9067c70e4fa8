//! Error types for the libpal retrieval core.
//!
//! Uses `thiserror` for public API error types. Each stage of the pipeline
//! (chunking, embedding, indexing, generation) owns its own enum, and
//! `LibpalError` wraps them so callers can match on the failing stage.
//!
//! An empty knowledge base is not an error. Retrieval reports it as an empty
//! result set.

/// Top-level error type for the libpal core library.
#[derive(Debug, thiserror::Error)]
pub enum LibpalError {
    #[error("Embedding unavailable: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Invalid chunk config: {0}")]
    Chunk(#[from] ChunkError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Knowledge base error: {0}")]
    KnowledgeBase(#[from] KnowledgeBaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the embedding capability.
///
/// Both variants are fatal to the insert or search call that triggered them.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("{provider} embedding backend unreachable: {message}")]
    Unavailable { provider: String, message: String },

    #[error("malformed embedding output: {message}")]
    MalformedOutput { message: String },
}

/// Errors from the external generation capability.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Model returned an empty answer")]
    EmptyResponse,

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Chunker parameter errors, raised before any text is processed.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("chunk_size ({chunk_size}) must be positive and greater than overlap ({overlap})")]
    InvalidConfig { chunk_size: usize, overlap: usize },
}

/// Errors from the vector index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors from session-level knowledge base management.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeBaseError {
    #[error("Document already loaded: {source_id}")]
    DuplicateSource { source_id: String },
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

impl From<Box<figment::Error>> for ConfigError {
    fn from(err: Box<figment::Error>) -> Self {
        ConfigError::ParseError {
            message: err.to_string(),
        }
    }
}

/// Result type alias for libpal operations.
pub type Result<T> = std::result::Result<T, LibpalError>;
