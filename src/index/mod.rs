//! Vector index abstraction.
//!
//! [`VectorIndex`] is the storage seam of the engine, polymorphic over a
//! durable production backend ([`SqliteIndex`]) and an in-memory
//! linear-scan reference implementation ([`MemoryIndex`]) used to pin down
//! exact-cosine, deterministic behavior in tests.
//!
//! A query never returns more than `k` results and never returns a chunk
//! whose vector was not present at query time. Ordering is descending
//! similarity with ties broken by ascending chunk id.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

use async_trait::async_trait;

use crate::error::KbError;
use crate::models::{Chunk, ScoredChunk};

/// Abstract vector store for chunk embeddings plus chunk metadata.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embedding model the stored vectors were produced with.
    fn model_id(&self) -> &str;

    /// Dimensionality of stored vectors.
    fn dims(&self) -> usize;

    /// Insert or replace a chunk and its vector.
    async fn upsert(&self, chunk: &Chunk, vector: &[f32]) -> Result<(), KbError>;

    /// Nearest-neighbor query by cosine similarity.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, KbError>;

    /// Number of stored chunks.
    async fn count(&self) -> Result<usize, KbError>;

    /// All stored chunks in (document, chunk_index) order. Feeds stats and
    /// the selector-catalog rebuild.
    async fn dump_chunks(&self) -> Result<Vec<Chunk>, KbError>;

    /// Flush pending writes to durable storage. No-op for memory.
    async fn persist(&self) -> Result<(), KbError>;
}

/// Rank candidates: similarity descending, chunk id ascending on ties,
/// truncated to `k`. Shared by every implementation so ordering is
/// identical across backends.
pub(crate) fn rank(mut hits: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    hits.truncate(k);
    hits
}
