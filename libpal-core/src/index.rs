//! In-memory vector index with exact cosine top-k search.
//!
//! Vectors are normalized once at insertion, so cosine similarity reduces to
//! an inner product. Search is a brute-force scan feeding a bounded min-heap,
//! which is plenty for a handful of documents and a few thousand chunks.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::embeddings::{Embedder, conform_embeddings, l2_normalize};
use crate::error::{EmbeddingError, IndexError};
use crate::types::{Chunk, EmbeddedChunk, RetrievalResult};

/// A vector index shared between the session's write path and the retriever.
///
/// One coarse lock guards insert, search and reset.
pub type SharedIndex = Arc<Mutex<VectorIndex>>;

/// Inner product of two equal-length vectors. On unit vectors this is cosine similarity.
pub fn dot_similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Append-only store of embedded chunks.
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    entries: Vec<EmbeddedChunk>,
}

impl VectorIndex {
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
            entries: Vec::new(),
        }
    }

    /// Wrap this index in the lock used by sessions and retrievers.
    pub fn into_shared(self) -> SharedIndex {
        Arc::new(Mutex::new(self))
    }

    /// Embed `chunks` and append them in order.
    ///
    /// All-or-nothing: if any embedding batch fails or returns malformed
    /// vectors, the index is left exactly as it was. Returns the number of
    /// chunks added.
    pub async fn insert(&mut self, chunks: Vec<Chunk>) -> Result<usize, EmbeddingError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let dims = self.embedder.dimensions();
        let mut staged = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            let vectors = conform_embeddings(vectors, texts.len(), dims)?;
            staged.extend(vectors);
        }

        let added = chunks.len();
        self.entries.reserve(added);
        self.entries.extend(
            chunks
                .into_iter()
                .zip(staged)
                .map(|(chunk, vector)| EmbeddedChunk { chunk, vector }),
        );

        tracing::debug!(added, total = self.entries.len(), "Inserted chunks into index");
        Ok(added)
    }

    /// Return up to `k` chunks ordered by descending cosine similarity.
    ///
    /// `k` larger than the index is clamped. Equal scores keep insertion
    /// order. An empty index yields an empty result.
    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>, IndexError> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let dims = self.embedder.dimensions();
        if query_vector.len() != dims {
            return Err(IndexError::DimensionMismatch {
                expected: dims,
                actual: query_vector.len(),
            });
        }

        let mut query = query_vector.to_vec();
        l2_normalize(&mut query);

        let k = k.min(self.entries.len());
        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(k + 1);

        for (position, entry) in self.entries.iter().enumerate() {
            let score = dot_similarity(&query, &entry.vector);
            if !score.is_finite() {
                continue;
            }
            heap.push(HeapEntry {
                score: score.clamp(-1.0, 1.0),
                position,
            });
            if heap.len() > k {
                heap.pop();
            }
        }

        // Ascending order of "worse" is best-first.
        let ranked = heap.into_sorted_vec();

        Ok(ranked
            .into_iter()
            .map(|e| RetrievalResult {
                chunk: self.entries[e.position].chunk.clone(),
                score: e.score,
            })
            .collect())
    }

    /// Discard every stored chunk.
    pub fn reset(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        tracing::info!(dropped, "Vector index reset");
    }

    /// Number of stored chunks.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Stored chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }
}

/// Heap entry ordered so that the *worst* candidate sits on top of the
/// max-heap: lower score first, then later insertion position.
#[derive(Debug)]
struct HeapEntry {
    score: f32,
    position: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.position.cmp(&other.position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::LocalEmbedder;
    use async_trait::async_trait;

    fn chunk(text: &str, source: &str, index: usize) -> Chunk {
        Chunk {
            text: text.to_string(),
            source_id: source.to_string(),
            chunk_index: index,
            char_start: 0,
            char_end: text.chars().count(),
        }
    }

    fn local_index() -> VectorIndex {
        VectorIndex::new(Arc::new(LocalEmbedder::new(128)), 2)
    }

    /// Fails on the Nth call to `embed`.
    struct FlakyEmbedder {
        inner: LocalEmbedder,
        fail_on_call: usize,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let call = self
                .calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call == self.fail_on_call {
                return Err(EmbeddingError::Unavailable {
                    provider: "flaky".into(),
                    message: "backend went away".into(),
                });
            }
            self.inner.embed(texts).await
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        fn provider_name(&self) -> &str {
            "flaky"
        }
    }

    /// Returns one vector too few.
    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(vec![vec![1.0, 0.0]; texts.len().saturating_sub(1)])
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn provider_name(&self) -> &str {
            "short"
        }
    }

    #[tokio::test]
    async fn test_insert_grows_size_exactly() {
        let mut index = local_index();
        assert_eq!(index.size(), 0);
        let added = index
            .insert(vec![chunk("a b", "d", 0), chunk("c d", "d", 1), chunk("e", "d", 2)])
            .await
            .unwrap();
        assert_eq!(added, 3);
        assert_eq!(index.size(), 3);
    }

    #[tokio::test]
    async fn test_reset_empties_index() {
        let mut index = local_index();
        index.insert(vec![chunk("text", "d", 0)]).await.unwrap();
        index.reset();
        assert_eq!(index.size(), 0);
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_identical_query_ranks_first_with_max_score() {
        let embedder = LocalEmbedder::new(128);
        let mut index = VectorIndex::new(Arc::new(embedder.clone()), 8);
        index
            .insert(vec![
                chunk("dogs bark loudly", "doc2", 0),
                chunk("catsare mammals", "doc1", 0),
            ])
            .await
            .unwrap();

        let query = embedder.embed_one("catsare mammals");
        let results = index.search(&query, 2).unwrap();
        assert_eq!(results[0].chunk.source_id, "doc1");
        assert!((results[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_search_sorted_and_clamped_to_size() {
        let embedder = LocalEmbedder::new(64);
        let mut index = VectorIndex::new(Arc::new(embedder.clone()), 3);
        let texts = ["alpha beta", "beta gamma", "gamma delta", "delta alpha", "epsilon"];
        index
            .insert(
                texts
                    .iter()
                    .enumerate()
                    .map(|(i, t)| chunk(t, "d", i))
                    .collect(),
            )
            .await
            .unwrap();

        let query = embedder.embed_one("alpha gamma");
        let results = index.search(&query, 50).unwrap();
        assert_eq!(results.len(), texts.len());
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_equal_scores_keep_insertion_order() {
        let embedder = LocalEmbedder::new(64);
        let mut index = VectorIndex::new(Arc::new(embedder.clone()), 10);
        index
            .insert((0..6).map(|i| chunk("same words", "d", i)).collect())
            .await
            .unwrap();

        let query = embedder.embed_one("same words");
        let results = index.search(&query, 3).unwrap();
        let order: Vec<usize> = results.iter().map(|r| r.chunk.chunk_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_search_empty_index_returns_empty() {
        let index = local_index();
        let results = index.search(&[0.5; 128], 5).unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_rejects_wrong_dimension() {
        let mut index = local_index();
        index.insert(vec![chunk("text", "d", 0)]).await.unwrap();
        let err = index.search(&[1.0, 0.0], 1).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 128,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_failed_batch_commits_nothing() {
        let embedder = FlakyEmbedder {
            inner: LocalEmbedder::new(32),
            fail_on_call: 2,
            calls: Default::default(),
        };
        let mut index = VectorIndex::new(Arc::new(embedder), 2);
        index.insert(vec![chunk("keep me", "a", 0)]).await.unwrap();

        // Batches of 2: the first batch of this call succeeds, the second fails.

        let before = index.size();
        let err = index
            .insert((0..5).map(|i| chunk("more", "b", i)).collect())
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::Unavailable { .. }));
        assert_eq!(index.size(), before);
    }

    #[tokio::test]
    async fn test_malformed_output_commits_nothing() {
        let mut index = VectorIndex::new(Arc::new(ShortEmbedder), 10);
        let err = index
            .insert(vec![chunk("a", "d", 0), chunk("b", "d", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::MalformedOutput { .. }));
        assert_eq!(index.size(), 0);
    }

    #[test]
    fn test_heap_entry_orders_worst_first() {
        let better = HeapEntry {
            score: 0.9,
            position: 5,
        };
        let worse = HeapEntry {
            score: 0.1,
            position: 0,
        };
        let later_tie = HeapEntry {
            score: 0.9,
            position: 7,
        };
        assert!(worse > better);
        assert!(later_tie > better);
    }
}
