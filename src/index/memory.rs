//! In-memory [`VectorIndex`] for tests and reference behavior.
//!
//! Brute-force exact cosine similarity over all stored vectors behind a
//! `std::sync::RwLock`. Operations complete immediately; the async
//! signatures exist to satisfy the trait.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::KbError;
use crate::models::{Chunk, ScoredChunk};

use super::{rank, VectorIndex};

pub struct MemoryIndex {
    model: String,
    dims: usize,
    entries: RwLock<Vec<(Chunk, Vec<f32>)>>,
}

impl MemoryIndex {
    pub fn new(model: impl Into<String>, dims: usize) -> Self {
        Self {
            model: model.into(),
            dims,
            entries: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, chunk: &Chunk, vector: &[f32]) -> Result<(), KbError> {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|(c, _)| c.id != chunk.id);
        entries.push((chunk.clone(), vector.to_vec()));
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, KbError> {
        let entries = self.entries.read().unwrap();
        let hits: Vec<ScoredChunk> = entries
            .iter()
            .map(|(chunk, stored)| ScoredChunk {
                chunk: chunk.clone(),
                score: cosine_similarity(vector, stored) as f64,
            })
            .collect();
        Ok(rank(hits, k))
    }

    async fn count(&self) -> Result<usize, KbError> {
        Ok(self.entries.read().unwrap().len())
    }

    async fn dump_chunks(&self) -> Result<Vec<Chunk>, KbError> {
        let mut chunks: Vec<Chunk> = self
            .entries
            .read()
            .unwrap()
            .iter()
            .map(|(c, _)| c.clone())
            .collect();
        chunks.sort_by(|a, b| {
            a.document
                .cmp(&b.document)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        Ok(chunks)
    }

    async fn persist(&self) -> Result<(), KbError> {
        Ok(())
    }
}
