//! Context compilation for retrieval results.
//!
//! Renders retrieved chunks into the prompt context handed to the external
//! generation call, tagging every chunk with an explicit citation so the
//! generator can quote it verbatim, and derives the [`GroundingSet`] —
//! exactly the documents present in the result, no more, no fewer.

use crate::models::{GroundingSet, RetrievalResult};

/// Marker compiled in place of context when nothing was retrieved, so the
/// caller can refuse generation rather than invent content.
pub const NO_CONTEXT_MARKER: &str = "[no relevant context]";

/// Compiled prompt context plus the allowed-citation set for one
/// generation call.
#[derive(Debug, Clone)]
pub struct CompiledContext {
    pub prompt: String,
    pub grounding: GroundingSet,
}

impl CompiledContext {
    pub fn has_context(&self) -> bool {
        !self.grounding.is_empty()
    }
}

/// Render each retrieved chunk under its citation tag
/// (`[source: <filename>#<chunkIndex>]`), separated by `---` lines.
pub fn compile_context(result: &RetrievalResult) -> CompiledContext {
    if result.hits.is_empty() {
        return CompiledContext {
            prompt: NO_CONTEXT_MARKER.to_string(),
            grounding: GroundingSet::default(),
        };
    }

    let sections: Vec<String> = result
        .hits
        .iter()
        .map(|hit| {
            format!(
                "[source: {}#{}]\n{}",
                hit.chunk.document, hit.chunk.chunk_index, hit.chunk.text
            )
        })
        .collect();

    let grounding =
        GroundingSet::from_documents(result.hits.iter().map(|h| h.chunk.document.clone()));

    CompiledContext {
        prompt: sections.join("\n---\n"),
        grounding,
    }
}
