//! Unified error types for the engine.
//!
//! Per-document and per-chunk failures are recoverable — the ingestion
//! batch records them and continues. Configuration errors
//! ([`KbError::ChunkConfig`], [`KbError::ModelMismatch`]) abort before any
//! work starts. Grounding rejections are *not* errors; they are normal
//! [`ValidationOutcome`](crate::grounding::ValidationOutcome) values.

use thiserror::Error;

use crate::models::DocFormat;

/// Top-level error for knowledge-base operations.
#[derive(Debug, Error)]
pub enum KbError {
    /// A document whose declared format parser could not decode it.
    /// The document is skipped and reported; the batch continues.
    #[error("parse error in '{document}' ({format}): {reason}")]
    Parse {
        document: String,
        format: DocFormat,
        reason: String,
    },

    /// Invalid chunking parameters. Fatal at startup, before any work.
    #[error("chunk configuration error: {0}")]
    ChunkConfig(String),

    /// Embedding failure. Recoverable per chunk; a document whose chunks
    /// all fail is treated as that document's ingestion failure.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The persisted index was built with a different embedding model.
    #[error("embedding model mismatch: index built with '{index_model}', config wants '{config_model}'")]
    ModelMismatch {
        index_model: String,
        config_model: String,
    },

    /// The vector index cannot serve the request.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    /// Storage backend failure.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// (De)serialization of persisted chunk metadata.
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// Filesystem errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
