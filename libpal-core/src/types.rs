//! Core data types shared across the retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A contiguous slice of a source document.
///
/// Offsets are character (not byte) positions in the source text, so
/// `char_end - char_start` always equals `text.chars().count()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_id: String,
    /// Position of this chunk within its source, starting at 0.
    pub chunk_index: usize,
    pub char_start: usize,
    pub char_end: usize,
}

impl Chunk {
    /// Length of the chunk text in characters.
    pub fn char_len(&self) -> usize {
        self.char_end - self.char_start
    }
}

/// A chunk paired with its L2-normalized embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A chunk returned by a similarity search, with its cosine score in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub score: f32,
}

/// One answered question in a session.
///
/// Turns are never mutated after creation; the session only appends them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub question: String,
    pub answer: String,
    /// The retrieved chunks the answer was grounded on, best first.
    pub citations: Vec<RetrievalResult>,
    /// False when no relevant context was found and the generator was not called.
    pub grounded: bool,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        citations: Vec<RetrievalResult>,
        grounded: bool,
        latency_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            answer: answer.into(),
            citations,
            grounded,
            latency_ms,
            created_at: Utc::now(),
        }
    }
}

/// Summary of a document loaded into the knowledge base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub source_id: String,
    pub char_count: usize,
    pub chunk_count: usize,
    pub inserted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_char_len_counts_characters() {
        let chunk = Chunk {
            text: "héllo".into(),
            source_id: "doc".into(),
            chunk_index: 0,
            char_start: 10,
            char_end: 15,
        };
        assert_eq!(chunk.char_len(), chunk.text.chars().count());
    }

    #[test]
    fn test_conversation_turn_ids_are_unique() {
        let a = ConversationTurn::new("q", "a", Vec::new(), true, 5);
        let b = ConversationTurn::new("q", "a", Vec::new(), true, 5);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_conversation_turn_serialization() {
        let turn = ConversationTurn::new("What?", "This.", Vec::new(), false, 12);
        let json = serde_json::to_string(&turn).unwrap();
        let parsed: ConversationTurn = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, turn);
    }
}
