//! Fixed-window document chunking.
//!
//! Windows are cut on character boundaries without regard for words or
//! sentences; the overlap between neighbouring windows carries the context
//! that a mid-word cut would otherwise lose.

use crate::config::ChunkingConfig;
use crate::error::ChunkError;
use crate::types::Chunk;

/// Split `text` into overlapping windows of `chunk_size` characters.
///
/// Consecutive windows start `chunk_size - overlap` characters apart. The last
/// window is truncated to the remaining text, and a text no longer than
/// `chunk_size` yields exactly one chunk. Empty text yields no chunks.
pub fn chunk_text(
    text: &str,
    source_id: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ChunkError> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(ChunkError::InvalidConfig {
            chunk_size,
            overlap,
        });
    }

    let chars: Vec<char> = text.chars().collect();
    let stride = chunk_size - overlap;
    let mut chunks = Vec::with_capacity(chars.len().div_ceil(stride));
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(Chunk {
            text: chars[start..end].iter().collect(),
            source_id: source_id.to_string(),
            chunk_index: chunks.len(),
            char_start: start,
            char_end: end,
        });
        if end == chars.len() {
            break;
        }
        start += stride;
    }

    Ok(chunks)
}

/// A chunker bound to a validated window configuration.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(ChunkError::InvalidConfig {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ChunkError> {
        Self::new(config.chunk_size, config.overlap)
    }

    pub fn chunk(&self, text: &str, source_id: &str) -> Vec<Chunk> {
        // Parameters were validated in `new`, so this cannot fail.
        chunk_text(text, source_id, self.chunk_size, self.overlap).unwrap_or_default()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

impl Default for Chunker {
    fn default() -> Self {
        let config = ChunkingConfig::default();
        Self {
            chunk_size: config.chunk_size,
            overlap: config.overlap,
        }
    }
}
