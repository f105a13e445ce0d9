//! Knowledge-base handle: build, retrieval, validation, selector lookup.
//!
//! [`KnowledgeBase`] is an explicit handle threaded through every call —
//! there is no process-wide state. The published index snapshot sits
//! behind a lock: rebuild populates a staging store without blocking
//! readers, then swaps it in under the write lock, so a concurrent query
//! sees either the pre-rebuild snapshot or the fully rebuilt one, never a
//! partially populated intermediate state.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::KbError;
use crate::grounding::{self, TestCase, ValidationOutcome};
use crate::index::{SqliteIndex, VectorIndex};
use crate::ingest::ingest_document;
use crate::models::{
    BuildError, BuildSummary, Chunk, GroundingSet, RetrievalResult, SourceDocument,
};
use crate::selectors::{SelectorCatalog, SelectorEntry};

/// Cooperative cancellation flag, checked between documents during a
/// rebuild. An in-flight single-document parse/embed is not interrupted.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Snapshot of knowledge-base state for the presentation collaborator.
#[derive(Debug, Clone)]
pub struct KbStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub selector_count: usize,
    pub model: String,
    pub dims: usize,
    pub rebuild_required: bool,
}

pub struct KnowledgeBase {
    config: Config,
    provider: Box<dyn EmbeddingProvider>,
    index: RwLock<Option<Arc<dyn VectorIndex>>>,
    catalog: std::sync::RwLock<Arc<SelectorCatalog>>,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl KnowledgeBase {
    /// Open a knowledge base from configuration.
    ///
    /// A missing or unreadable persisted store is recoverable: the handle
    /// starts empty and [`rebuild`](Self::rebuild) is required. A store
    /// built with a different embedding model is a configuration error.
    pub async fn open(config: Config) -> Result<Self, KbError> {
        config.chunking.validate()?;
        let provider = embedding::create_provider(&config.embedding)?;

        let index: Option<Arc<dyn VectorIndex>> =
            match SqliteIndex::open(&config.store.path).await? {
                Some(ix) => {
                    if ix.model_id() != provider.model_id() {
                        return Err(KbError::ModelMismatch {
                            index_model: ix.model_id().to_string(),
                            config_model: provider.model_id().to_string(),
                        });
                    }
                    Some(Arc::new(ix))
                }
                None => {
                    warn!(
                        path = %config.store.path.display(),
                        "no usable persisted index; starting empty, rebuild required"
                    );
                    None
                }
            };

        let catalog = match &index {
            Some(ix) => catalog_from_chunks(&ix.dump_chunks().await?),
            None => SelectorCatalog::default(),
        };

        Ok(Self {
            config,
            provider,
            index: RwLock::new(index),
            catalog: std::sync::RwLock::new(Arc::new(catalog)),
        })
    }

    /// True when no index snapshot is available and a rebuild is required.
    pub async fn needs_rebuild(&self) -> bool {
        self.index.read().await.is_none()
    }

    /// Rebuild the knowledge base wholesale from `documents`.
    ///
    /// Per-document failures are recorded in the summary and never abort
    /// the batch. A cancelled rebuild discards the staging store and
    /// publishes nothing; the previous snapshot stays live.
    pub async fn rebuild(
        &self,
        documents: &[SourceDocument],
        cancel: &CancelToken,
    ) -> Result<BuildSummary, KbError> {
        let store_path = self.config.store.path.clone();
        let staging_path = suffixed(&store_path, ".rebuild");

        info!(
            documents = documents.len(),
            store = %store_path.display(),
            "rebuilding knowledge base"
        );

        let staging = SqliteIndex::create(
            &staging_path,
            self.provider.model_id(),
            self.provider.dims(),
        )
        .await?;

        let mut summary = BuildSummary::default();

        for doc in documents {
            if cancel.is_cancelled() {
                info!(
                    ingested = summary.document_count,
                    "rebuild cancelled; discarding staging store"
                );
                summary.cancelled = true;
                staging.close().await;
                let _ = std::fs::remove_file(&staging_path);
                return Ok(summary);
            }

            match ingest_document(
                doc,
                &self.config.chunking,
                &self.config.embedding,
                self.provider.as_ref(),
                &staging,
            )
            .await
            {
                Ok(outcome) => {
                    summary.document_count += 1;
                    summary.chunk_count += outcome.chunk_count;
                    *summary
                        .per_format_counts
                        .entry(doc.format.to_string())
                        .or_insert(0) += 1;
                }
                Err(e) => {
                    warn!(document = %doc.filename, "document skipped: {e}");
                    summary.errors.push(BuildError {
                        filename: doc.filename.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        staging.persist().await?;
        staging.close().await;

        // Publish: swap the staging store in under the write lock. Queries
        // either complete against the old snapshot before the swap or see
        // the new one after it.
        let mut guard = self.index.write().await;
        let _ = std::fs::remove_file(suffixed(&store_path, "-wal"));
        let _ = std::fs::remove_file(suffixed(&store_path, "-shm"));
        std::fs::rename(&staging_path, &store_path)?;

        let fresh = SqliteIndex::open(&store_path).await?.ok_or_else(|| {
            KbError::IndexUnavailable("rebuilt store failed to reopen".to_string())
        })?;
        let chunks = fresh.dump_chunks().await?;
        *guard = Some(Arc::new(fresh));
        drop(guard);

        *self.catalog.write().unwrap() = Arc::new(catalog_from_chunks(&chunks));

        info!(
            documents = summary.document_count,
            chunks = summary.chunk_count,
            failed = summary.errors.len(),
            "rebuild complete"
        );

        Ok(summary)
    }

    /// Retrieve the top-k chunks for a query.
    ///
    /// An empty or unavailable index degrades to an empty result rather
    /// than failing; `k` defaults to the configured `retrieval.top_k`.
    pub async fn retrieve(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<RetrievalResult, KbError> {
        let k = k.unwrap_or(self.config.retrieval.top_k);

        let guard = self.index.read().await;
        let index = match guard.as_ref() {
            Some(index) => index,
            None => {
                return Ok(RetrievalResult {
                    hits: Vec::new(),
                    degraded: true,
                })
            }
        };

        if query.trim().is_empty() {
            return Ok(RetrievalResult::default());
        }

        let query_vec =
            embedding::embed_query(self.provider.as_ref(), &self.config.embedding, query).await?;
        let hits = index.query(&query_vec, k).await?;

        Ok(RetrievalResult {
            hits,
            degraded: false,
        })
    }

    /// Validate an artifact against a grounding set. Pure passthrough to
    /// [`grounding::validate`], kept on the handle so callers thread one
    /// object through query → generation → validation.
    pub fn validate(&self, artifact: &TestCase, grounding: &GroundingSet) -> ValidationOutcome {
        grounding::validate(artifact, grounding)
    }

    /// Selector entries for a semantic role hint, most-specific first.
    pub fn selectors_for(&self, role_hint: &str) -> Vec<SelectorEntry> {
        let catalog = self.catalog.read().unwrap().clone();
        catalog.selectors_for(role_hint)
    }

    pub async fn stats(&self) -> Result<KbStats, KbError> {
        let guard = self.index.read().await;
        let (document_count, chunk_count, rebuild_required) = match guard.as_ref() {
            Some(index) => {
                let chunks = index.dump_chunks().await?;
                let documents: std::collections::BTreeSet<&str> =
                    chunks.iter().map(|c| c.document.as_str()).collect();
                (documents.len(), chunks.len(), false)
            }
            None => (0, 0, true),
        };

        Ok(KbStats {
            document_count,
            chunk_count,
            selector_count: self.catalog.read().unwrap().len(),
            model: self.provider.model_id().to_string(),
            dims: self.provider.dims(),
            rebuild_required,
        })
    }
}

fn catalog_from_chunks(chunks: &[Chunk]) -> SelectorCatalog {
    let elements: Vec<_> = chunks
        .iter()
        .flat_map(|c| c.selectors.iter().cloned())
        .collect();
    SelectorCatalog::build(&elements)
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}
