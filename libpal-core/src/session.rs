//! A question-answering session over an owned knowledge base.
//!
//! The session owns everything with a lifecycle: the vector index, the list
//! of loaded documents, and the conversation history. It is created on
//! session start and cleared on reset; nothing lives in process-wide state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::chunk::Chunker;
use crate::config::LibpalConfig;
use crate::embeddings::{Embedder, create_embedder};
use crate::error::{KnowledgeBaseError, Result};
use crate::index::{SharedIndex, VectorIndex};
use crate::orchestrator::{AnswerSettings, Orchestrator};
use crate::providers::{Generator, create_generator};
use crate::retriever::Retriever;
use crate::types::{ConversationTurn, DocumentInfo};

/// One user's knowledge base and conversation.
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    chunker: Chunker,
    index: SharedIndex,
    orchestrator: Orchestrator,
    documents: Vec<DocumentInfo>,
    history: Vec<ConversationTurn>,
}

impl Session {
    /// Create a session with explicit embedding and generation backends.
    ///
    /// The configuration is validated first; an invalid chunk window is
    /// rejected here, before any document is processed.
    pub fn new(
        config: &LibpalConfig,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        config.validate()?;

        let chunker = Chunker::from_config(&config.chunking)?;
        let index = VectorIndex::new(embedder.clone(), config.embedding.batch_size).into_shared();
        let retriever = Retriever::new(embedder, index.clone());
        let orchestrator =
            Orchestrator::new(retriever, generator, AnswerSettings::from_config(config));

        let session = Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            chunker,
            index,
            orchestrator,
            documents: Vec::new(),
            history: Vec::new(),
        };
        tracing::info!(session_id = %session.id, "Session started");
        Ok(session)
    }

    /// Create a session whose backends are built from `config`.
    pub fn from_config(config: &LibpalConfig) -> Result<Self> {
        config.validate()?;
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        Self::new(config, embedder, generator)
    }

    /// Chunk, embed and index a document.
    ///
    /// Returns the number of chunks added. Empty text adds nothing. A
    /// `source_id` that is already loaded is rejected; reset the knowledge
    /// base to replace a document. On an embedding failure nothing is added.
    pub async fn insert_document(&mut self, source_id: &str, text: &str) -> Result<usize> {
        if self.documents.iter().any(|d| d.source_id == source_id) {
            return Err(KnowledgeBaseError::DuplicateSource {
                source_id: source_id.to_string(),
            }
            .into());
        }

        let chunks = self.chunker.chunk(text, source_id);
        if chunks.is_empty() {
            tracing::warn!(source_id, "Document has no text; nothing indexed");
            return Ok(0);
        }

        let added = self.index.lock().await.insert(chunks).await?;

        self.documents.push(DocumentInfo {
            source_id: source_id.to_string(),
            char_count: text.chars().count(),
            chunk_count: added,
            inserted_at: Utc::now(),
        });
        tracing::info!(source_id, chunks = added, "Document indexed");
        Ok(added)
    }

    /// Drop every document and the conversation that was grounded on them.
    pub async fn reset_knowledge_base(&mut self) {
        self.index.lock().await.reset();
        self.documents.clear();
        self.history.clear();
        tracing::info!(session_id = %self.id, "Knowledge base reset");
    }

    /// Answer a question and record the turn in the session history.
    ///
    /// Failed questions are not recorded.
    pub async fn ask(&mut self, question: &str) -> Result<ConversationTurn> {
        let question = question.trim();
        let turn = self.orchestrator.answer(question, &self.history).await?;
        self.history.push(turn.clone());
        Ok(turn)
    }

    /// Forget the conversation but keep the knowledge base.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn last_turn(&self) -> Option<&ConversationTurn> {
        self.history.last()
    }

    pub fn documents(&self) -> &[DocumentInfo] {
        &self.documents
    }

    /// Number of chunks currently indexed.
    pub async fn chunk_count(&self) -> usize {
        self.index.lock().await.size()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn model_name(&self) -> &str {
        self.orchestrator.generator().model_name()
    }

    pub fn embedder_name(&self) -> &str {
        self.orchestrator.retriever().embedder().provider_name()
    }
}
