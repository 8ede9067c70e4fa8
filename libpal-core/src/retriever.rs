//! Query-time retrieval: embed, search, then enforce the context budget.

use std::sync::Arc;

use crate::embeddings::{Embedder, conform_embeddings};
use crate::error::Result;
use crate::index::SharedIndex;
use crate::types::RetrievalResult;

/// Keep the longest best-first prefix of `candidates` whose summed chunk
/// length (in characters) fits within `max_context_chars`.
///
/// Chunks are included whole or not at all, and inclusion stops at the first
/// chunk that would overflow the budget, even if a later, smaller one would fit.
pub fn apply_context_budget(
    candidates: Vec<RetrievalResult>,
    max_context_chars: usize,
) -> Vec<RetrievalResult> {
    let mut used = 0usize;
    let mut included = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let len = candidate.chunk.text.chars().count();
        if used + len > max_context_chars {
            tracing::debug!(
                used,
                next_len = len,
                budget = max_context_chars,
                "Context budget reached"
            );
            break;
        }
        used += len;
        included.push(candidate);
    }
    included
}

/// Retrieves budget-bounded context for a question.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: SharedIndex,
}

impl Retriever {
    /// `embedder` must be the same model the index was built with.
    pub fn new(embedder: Arc<dyn Embedder>, index: SharedIndex) -> Self {
        Self { embedder, index }
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Return the top `k` chunks for `query`, trimmed to `max_context_chars`.
    ///
    /// An empty index yields an empty result without calling the embedder.
    /// Embedding failures propagate. The index is only read.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        max_context_chars: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if k == 0 || self.index.lock().await.is_empty() {
            tracing::debug!("Knowledge base is empty, nothing to retrieve");
            return Ok(Vec::new());
        }

        let dims = self.embedder.dimensions();
        let vectors = self.embedder.embed(&[query.to_string()]).await?;
        let mut vectors = conform_embeddings(vectors, 1, dims)?;
        let query_vector = vectors.remove(0);

        let candidates = self.index.lock().await.search(&query_vector, k)?;
        let candidate_count = candidates.len();
        let results = apply_context_budget(candidates, max_context_chars);

        tracing::debug!(
            k,
            candidates = candidate_count,
            included = results.len(),
            top_score = results.first().map(|r| r.score),
            "Retrieved context"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::LocalEmbedder;
    use crate::error::{EmbeddingError, LibpalError};
    use crate::index::VectorIndex;
    use crate::types::Chunk;
    use async_trait::async_trait;

    fn result(text: &str, index: usize, score: f32) -> RetrievalResult {
        RetrievalResult {
            chunk: Chunk {
                text: text.to_string(),
                source_id: "doc".into(),
                chunk_index: index,
                char_start: 0,
                char_end: text.chars().count(),
            },
            score,
        }
    }

    async fn retriever_with(texts: &[&str]) -> Retriever {
        let embedder: Arc<dyn Embedder> = Arc::new(LocalEmbedder::new(128));
        let mut index = VectorIndex::new(embedder.clone(), 16);
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk {
                text: t.to_string(),
                source_id: "doc".into(),
                chunk_index: i,
                char_start: 0,
                char_end: t.chars().count(),
            })
            .collect();
        index.insert(chunks).await.unwrap();
        Retriever::new(embedder, index.into_shared())
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        async fn embed(&self, _texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::Unavailable {
                provider: "down".into(),
                message: "connection refused".into(),
            })
        }

        fn dimensions(&self) -> usize {
            128
        }

        fn provider_name(&self) -> &str {
            "down"
        }
    }

    #[test]
    fn test_budget_stops_at_first_overflow() {
        let candidates = vec![
            result(&"a".repeat(40), 0, 0.9),
            result(&"b".repeat(70), 1, 0.8),
            result(&"c".repeat(10), 2, 0.7),
        ];
        let included = apply_context_budget(candidates, 100);
        assert_eq!(included.len(), 1);
        assert_eq!(included[0].chunk.chunk_index, 0);
    }

    #[test]
    fn test_budget_exact_fit_is_included() {
        let candidates = vec![result(&"a".repeat(60), 0, 0.9), result(&"b".repeat(40), 1, 0.8)];
        assert_eq!(apply_context_budget(candidates, 100).len(), 2);
    }

    #[test]
    fn test_budget_oversized_first_chunk_yields_nothing() {
        let candidates = vec![result(&"a".repeat(200), 0, 0.9), result("b", 1, 0.8)];
        assert!(apply_context_budget(candidates, 100).is_empty());
    }

    #[test]
    fn test_budget_counts_characters_not_bytes() {
        let candidates = vec![result(&"é".repeat(50), 0, 0.9)];
        assert_eq!(apply_context_budget(candidates, 50).len(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_empty_index_returns_empty() {
        let embedder: Arc<dyn Embedder> = Arc::new(LocalEmbedder::new(128));
        let index = VectorIndex::new(embedder.clone(), 8).into_shared();
        let retriever = Retriever::new(embedder, index);
        let results = retriever.retrieve("anything", 5, 1000).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_empty_index_does_not_need_embedder() {
        let embedder: Arc<dyn Embedder> = Arc::new(DownEmbedder);
        let index = VectorIndex::new(embedder.clone(), 8).into_shared();
        let retriever = Retriever::new(embedder, index);
        assert!(retriever.retrieve("anything", 5, 1000).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_ranks_relevant_chunk_first() {
        let retriever = retriever_with(&[
            "The reading room closes at 8pm on weekdays",
            "Late fees are 10 cents per day",
            "Study rooms can be booked online",
        ])
        .await;
        let results = retriever.retrieve("late fees per day", 3, 4000).await.unwrap();
        assert_eq!(results[0].chunk.chunk_index, 1);
    }

    #[tokio::test]
    async fn test_retrieve_respects_budget() {
        let short = "alpha ".repeat(30);
        let long = "alpha beta ".repeat(30);
        let retriever = retriever_with(&[short.as_str(), long.as_str()]).await;
        let results = retriever.retrieve("alpha", 2, 200).await.unwrap();
        let total: usize = results.iter().map(|r| r.chunk.text.chars().count()).sum();
        assert!(total <= 200);
    }

    #[tokio::test]
    async fn test_retrieve_propagates_embedding_failure() {
        let local: Arc<dyn Embedder> = Arc::new(LocalEmbedder::new(128));
        let mut index = VectorIndex::new(local, 8);
        index
            .insert(vec![Chunk {
                text: "content".into(),
                source_id: "doc".into(),
                chunk_index: 0,
                char_start: 0,
                char_end: 7,
            }])
            .await
            .unwrap();
        let retriever = Retriever::new(Arc::new(DownEmbedder), index.into_shared());
        let err = retriever.retrieve("content", 3, 1000).await.unwrap_err();
        assert!(matches!(err, LibpalError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_retrieve_is_deterministic() {
        let retriever = retriever_with(&["one two", "two three", "three one", "one two"]).await;
        let first = retriever.retrieve("one", 4, 4000).await.unwrap();
        let second = retriever.retrieve("one", 4, 4000).await.unwrap();
        assert_eq!(first, second);
    }
}
