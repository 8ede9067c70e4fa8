//! # libpal Core
//!
//! Retrieval core for libpal, a document question-answering assistant.
//! Provides fixed-window chunking, pluggable embedding and generation
//! backends, an in-memory cosine vector index, budget-bounded retrieval,
//! grounded answer orchestration, and the session that ties them together.

pub mod chunk;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod orchestrator;
pub mod prompt;
pub mod providers;
pub mod retriever;
pub mod session;
pub mod types;

// Re-export commonly used types at the crate root.
pub use chunk::{Chunker, chunk_text};
pub use config::{LibpalConfig, load_config};
pub use embeddings::{Embedder, LocalEmbedder, create_embedder};
pub use error::{
    ChunkError, ConfigError, EmbeddingError, GenerationError, IndexError, KnowledgeBaseError,
    LibpalError, Result,
};
pub use index::{SharedIndex, VectorIndex};
pub use orchestrator::{AnswerSettings, Orchestrator};
pub use prompt::NO_CONTEXT_ANSWER;
pub use providers::{GenerationRequest, Generator, MockGenerator, create_generator};
pub use retriever::{Retriever, apply_context_budget};
pub use session::Session;
pub use types::{Chunk, ConversationTurn, DocumentInfo, EmbeddedChunk, RetrievalResult};
