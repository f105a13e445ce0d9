//! Core data models used throughout the engine.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the ingestion and retrieval pipeline.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Declared format tag of an uploaded document.
///
/// Parser dispatch is by this tag, never by content sniffing; the upload
/// collaborator declares it (the CLI declares it from the file extension).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocFormat {
    Pdf,
    Markdown,
    Text,
    Json,
    Html,
}

impl DocFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocFormat::Pdf => "pdf",
            DocFormat::Markdown => "markdown",
            DocFormat::Text => "text",
            DocFormat::Json => "json",
            DocFormat::Html => "html",
        }
    }

    /// Map a file extension (without the dot, any case) to its format tag.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocFormat::Pdf),
            "md" | "markdown" => Some(DocFormat::Markdown),
            "txt" | "text" => Some(DocFormat::Text),
            "json" => Some(DocFormat::Json),
            "html" | "htm" => Some(DocFormat::Html),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw upload handed to ingestion: filename, declared format, byte content.
/// Immutable; replaced wholesale on knowledge-base rebuild.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub filename: String,
    pub format: DocFormat,
    pub content: Vec<u8>,
}

impl SourceDocument {
    pub fn new(filename: impl Into<String>, format: DocFormat, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            format,
            content,
        }
    }
}

/// One structural metadata tuple extracted from an HTML document: an
/// element that is interactive or carries a labeling attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    /// Custom test attribute (`data-test`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_attr: Option<String>,
    /// Text near the element in the extracted document, for role inference.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    /// Char offset of the element within the extracted text. Used to
    /// filter records into the chunk whose span contains them.
    pub offset: usize,
}

/// A bounded, overlapping segment of a document's extracted text — the
/// unit of retrieval.
///
/// Chunk ids are deterministic (`<filename>#<index>`, zero-padded) so the
/// tie-break ordering of retrieval results is stable across runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    /// Owning source document identifier (filename).
    pub document: String,
    /// Sequence index within the document, starting at 0.
    pub chunk_index: i64,
    pub text: String,
    /// Char span `[start, end)` in the extracted text.
    pub start: usize,
    pub end: usize,
    /// SHA-256 of the chunk text, for staleness detection.
    pub hash: String,
    /// Structural metadata whose origin falls inside the span (HTML only).
    pub selectors: Vec<ElementRecord>,
}

impl Chunk {
    /// Deterministic chunk identifier. Zero-padding keeps lexicographic
    /// order equal to numeric order.
    pub fn chunk_id(document: &str, index: i64) -> String {
        format!("{}#{:04}", document, index)
    }
}

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f64,
}

/// Ordered result of one retrieval: at most K chunks, best first, ties
/// broken by ascending chunk id. Transient, produced per query.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
    /// True when the index could not serve the query (missing store,
    /// rebuild required). An empty degraded result is returned instead of
    /// an error.
    pub degraded: bool,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// The set of source document identifiers supplied to one generation call.
/// Serves as the allowed-citation set for grounding validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundingSet(BTreeSet<String>);

impl GroundingSet {
    pub fn from_documents<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self(documents.into_iter().collect())
    }

    pub fn contains(&self, document: &str) -> bool {
        self.0.contains(document)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }
}

/// One failed document in a build batch.
#[derive(Debug, Clone, Serialize)]
pub struct BuildError {
    pub filename: String,
    pub reason: String,
}

/// Build output summary consumed by the presentation collaborator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildSummary {
    pub document_count: usize,
    pub chunk_count: usize,
    pub per_format_counts: BTreeMap<String, usize>,
    /// Every failed document with its reason, in batch order.
    pub errors: Vec<BuildError>,
    /// True when the batch was aborted by cancellation; nothing was
    /// published in that case.
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension() {
        assert_eq!(DocFormat::from_extension("md"), Some(DocFormat::Markdown));
        assert_eq!(DocFormat::from_extension("HTM"), Some(DocFormat::Html));
        assert_eq!(DocFormat::from_extension("rs"), None);
    }

    #[test]
    fn chunk_ids_sort_numerically() {
        let a = Chunk::chunk_id("pricing.md", 2);
        let b = Chunk::chunk_id("pricing.md", 10);
        assert!(a < b);
    }

    #[test]
    fn grounding_set_deduplicates() {
        let set = GroundingSet::from_documents(vec![
            "a.md".to_string(),
            "b.md".to_string(),
            "a.md".to_string(),
        ]);
        assert_eq!(set.len(), 2);
        assert!(set.contains("a.md"));
        assert!(!set.contains("c.md"));
    }
}
