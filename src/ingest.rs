//! Per-document ingestion: parse → chunk → embed → index.
//!
//! Failures are scoped per the error taxonomy: a parse failure skips the
//! document; an embedding failure skips the batch of chunks it covered
//! and the rest of the document continues; a document whose chunks all
//! fail to embed counts as that document's ingestion failure. Nothing
//! here aborts the surrounding build loop.

use tracing::{debug, warn};

use crate::chunk::split_chunks;
use crate::config::{ChunkingConfig, EmbeddingConfig};
use crate::embedding::{embed_texts, EmbeddingProvider};
use crate::error::KbError;
use crate::index::VectorIndex;
use crate::models::SourceDocument;
use crate::parse::parse_document;

/// Outcome of ingesting one document.
#[derive(Debug, Clone, Copy)]
pub struct DocumentIngest {
    /// Chunks actually embedded and indexed.
    pub chunk_count: usize,
    /// Chunks skipped because their embedding batch failed.
    pub chunks_skipped: usize,
}

/// Ingest one document into `index`.
pub async fn ingest_document(
    doc: &SourceDocument,
    chunking: &ChunkingConfig,
    embedding: &EmbeddingConfig,
    provider: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
) -> Result<DocumentIngest, KbError> {
    let parsed = parse_document(doc)?;
    let chunks = split_chunks(&doc.filename, &parsed.text, &parsed.elements, chunking)?;

    debug!(
        document = %doc.filename,
        format = %doc.format,
        chunks = chunks.len(),
        "parsed and chunked"
    );

    if chunks.is_empty() {
        return Ok(DocumentIngest {
            chunk_count: 0,
            chunks_skipped: 0,
        });
    }

    let mut stored = 0usize;
    let mut skipped = 0usize;

    for batch in chunks.chunks(embedding.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

        match embed_texts(provider, embedding, &texts).await {
            Ok(vectors) => {
                for (chunk, vector) in batch.iter().zip(vectors.iter()) {
                    index.upsert(chunk, vector).await?;
                    stored += 1;
                }
            }
            Err(e) => {
                warn!(document = %doc.filename, "embedding batch failed: {e}");
                skipped += batch.len();
            }
        }
    }

    if stored == 0 {
        return Err(KbError::Embedding(format!(
            "all {} chunks failed to embed",
            skipped
        )));
    }

    Ok(DocumentIngest {
        chunk_count: stored,
        chunks_skipped: skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{HashProvider, HASH_DIMS, HASH_MODEL_ID};
    use crate::index::MemoryIndex;
    use crate::models::DocFormat;

    fn configs() -> (ChunkingConfig, EmbeddingConfig) {
        (
            ChunkingConfig {
                min_chars: 40,
                max_chars: 80,
                overlap_chars: 10,
            },
            EmbeddingConfig::default(),
        )
    }

    #[tokio::test]
    async fn document_lands_in_the_index() {
        let (chunking, embedding) = configs();
        let provider = HashProvider::default();
        let index = MemoryIndex::new(HASH_MODEL_ID, HASH_DIMS);

        let doc = SourceDocument::new(
            "pricing.md",
            DocFormat::Markdown,
            b"# Pricing\n\nThe basic tier costs 10 EUR per month. The pro tier \
              costs 20 EUR per month and includes priority support."
                .to_vec(),
        );

        let outcome = ingest_document(&doc, &chunking, &embedding, &provider, &index)
            .await
            .unwrap();
        assert!(outcome.chunk_count > 0);
        assert_eq!(outcome.chunks_skipped, 0);
        assert_eq!(index.count().await.unwrap(), outcome.chunk_count);
    }

    #[tokio::test]
    async fn undecodable_document_is_a_parse_error() {
        let (chunking, embedding) = configs();
        let provider = HashProvider::default();
        let index = MemoryIndex::new(HASH_MODEL_ID, HASH_DIMS);

        let doc = SourceDocument::new("broken.pdf", DocFormat::Pdf, b"not a pdf".to_vec());
        let err = ingest_document(&doc, &chunking, &embedding, &provider, &index)
            .await
            .unwrap_err();
        assert!(matches!(err, KbError::Parse { .. }));
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_document_yields_zero_chunks() {
        let (chunking, embedding) = configs();
        let provider = HashProvider::default();
        let index = MemoryIndex::new(HASH_MODEL_ID, HASH_DIMS);

        let doc = SourceDocument::new("empty.txt", DocFormat::Text, Vec::new());
        let outcome = ingest_document(&doc, &chunking, &embedding, &provider, &index)
            .await
            .unwrap();
        assert_eq!(outcome.chunk_count, 0);
    }
}
