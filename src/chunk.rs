//! Overlapping min/max text chunker.
//!
//! Greedily consumes text up to `max_chars`, preferring to break at the
//! latest sentence or line boundary at or after `min_chars`; when no
//! boundary is in range it hard-cuts at `max_chars` exactly. Each
//! subsequent chunk begins `overlap_chars` before the previous chunk's
//! end, so concatenating a document's chunks and collapsing the overlap
//! reconstructs the extracted text exactly — nothing is trimmed.
//!
//! All positions are char offsets; a UTF-8 scalar is never split.

use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use crate::error::KbError;
use crate::models::{Chunk, ElementRecord};

/// Split extracted text into overlapping chunks, attaching the structural
/// metadata whose origin falls within each chunk's span.
///
/// Empty text yields no chunks. Invalid parameters (`overlap >= min`) are
/// a configuration error, rejected before any text is touched.
pub fn split_chunks(
    document: &str,
    text: &str,
    elements: &[ElementRecord],
    cfg: &ChunkingConfig,
) -> Result<Vec<Chunk>, KbError> {
    cfg.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut chunks = Vec::new();
    if len == 0 {
        return Ok(chunks);
    }

    let mut start = 0usize;
    let mut index: i64 = 0;

    loop {
        let hard_end = (start + cfg.max_chars).min(len);
        let end = if hard_end == len {
            len
        } else {
            boundary_in(&chars, start + cfg.min_chars, hard_end).unwrap_or(hard_end)
        };

        chunks.push(make_chunk(document, index, start, end, &chars, elements));
        index += 1;

        if end == len {
            break;
        }
        start = end - cfg.overlap_chars;
    }

    Ok(chunks)
}

/// Latest break position in `[lo, hi]` that follows a sentence end
/// (`. `, `! `, `? `) or a newline. `None` when the window has no
/// boundary, in which case the caller hard-cuts.
fn boundary_in(chars: &[char], lo: usize, hi: usize) -> Option<usize> {
    let mut pos = hi;
    while pos >= lo && pos >= 1 {
        if chars[pos - 1] == '\n' {
            return Some(pos);
        }
        if pos >= 2 && chars[pos - 1] == ' ' && matches!(chars[pos - 2], '.' | '!' | '?') {
            return Some(pos);
        }
        pos -= 1;
    }
    None
}

fn make_chunk(
    document: &str,
    index: i64,
    start: usize,
    end: usize,
    chars: &[char],
    elements: &[ElementRecord],
) -> Chunk {
    let text: String = chars[start..end].iter().collect();

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let selectors: Vec<ElementRecord> = elements
        .iter()
        .filter(|e| e.offset >= start && e.offset < end)
        .cloned()
        .collect();

    Chunk {
        id: Chunk::chunk_id(document, index),
        document: document.to_string(),
        chunk_index: index,
        text,
        start,
        end,
        hash,
        selectors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(min: usize, max: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            min_chars: min,
            max_chars: max,
            overlap_chars: overlap,
        }
    }

    /// Undo the overlap: first chunk whole, every later chunk minus its
    /// leading `overlap` chars.
    fn reconstruct(chunks: &[Chunk], overlap: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(&chunk.text);
            } else {
                out.extend(chunk.text.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn small_text_single_chunk() {
        let chunks = split_chunks("doc.txt", "Hello, world!", &[], &cfg(100, 150, 30)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunks = split_chunks("doc.txt", "", &[], &cfg(100, 150, 30)).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn three_hundred_chars_make_three_chunks() {
        // No sentence or line boundaries, so every cut is a hard cut.
        let text: String = "abcdefghij".repeat(30);
        assert_eq!(text.chars().count(), 300);

        let chunks = split_chunks("pricing.md", &text, &[], &cfg(100, 150, 30)).unwrap();
        assert_eq!(chunks.len(), 3);
        // Chunk 2 begins 30 chars before chunk 1's end.
        assert_eq!(chunks[1].start, chunks[0].end - 30);
        assert_eq!(chunks[2].start, chunks[1].end - 30);
        assert_eq!(chunks[2].end, 300);
    }

    #[test]
    fn round_trip_reconstructs_exactly() {
        let text = "Shipping is free over 50 EUR. Standard delivery takes 3 days.\n\n\
                    Express delivery is 9 EUR and takes one day. Returns are free \
                    within 30 days of purchase. Discount codes apply at checkout \
                    and stack with seasonal offers whenever the cart total stays \
                    above the free-shipping threshold."
            .to_string();
        let overlap = 20;
        let chunks = split_chunks("shipping.md", &text, &[], &cfg(60, 90, overlap)).unwrap();
        assert!(chunks.len() > 1);
        assert_eq!(reconstruct(&chunks, overlap), text);
    }

    #[test]
    fn round_trip_survives_multibyte_text() {
        let text = "Bezahlung über Kreditkarte ist möglich. Die Lieferung dauert \
                    täglich geprüfte drei Tage. Gutscheine gelten nur für Neukunden \
                    und müssen vor dem Bezahlen eingelöst werden — später geht es nicht."
            .to_string();
        let overlap = 15;
        let chunks = split_chunks("versand.md", &text, &[], &cfg(50, 70, overlap)).unwrap();
        assert!(chunks.len() > 1);
        assert_eq!(reconstruct(&chunks, overlap), text);
    }

    #[test]
    fn prefers_sentence_boundary_over_hard_cut() {
        // One sentence end inside the [min, max] window.
        let text = format!("{}. {}", "a".repeat(110), "b".repeat(200));
        let chunks = split_chunks("doc.txt", &text, &[], &cfg(100, 150, 30)).unwrap();
        // Break lands right after ". ", not at the 150-char hard cut.
        assert_eq!(chunks[0].end, 112);
        assert!(chunks[0].text.ends_with(". "));
    }

    #[test]
    fn hard_cut_when_no_boundary_in_window() {
        let text = "x".repeat(400);
        let chunks = split_chunks("doc.txt", &text, &[], &cfg(100, 150, 30)).unwrap();
        assert_eq!(chunks[0].end, 150);
    }

    #[test]
    fn overlap_at_least_min_is_rejected() {
        let err = split_chunks("doc.txt", "irrelevant", &[], &cfg(100, 150, 100)).unwrap_err();
        assert!(matches!(err, KbError::ChunkConfig(_)));
    }

    #[test]
    fn indices_and_ids_are_contiguous_and_deterministic() {
        let text = "y".repeat(500);
        let first = split_chunks("doc.txt", &text, &[], &cfg(100, 150, 30)).unwrap();
        let second = split_chunks("doc.txt", &text, &[], &cfg(100, 150, 30)).unwrap();
        assert_eq!(first.len(), second.len());
        for (i, (a, b)) in first.iter().zip(second.iter()).enumerate() {
            assert_eq!(a.chunk_index, i as i64);
            assert_eq!(a.id, Chunk::chunk_id("doc.txt", i as i64));
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
        }
    }

    #[test]
    fn selectors_filtered_by_span() {
        let text = "z".repeat(300);
        let elements = vec![
            ElementRecord {
                tag: "button".to_string(),
                id: Some("early".to_string()),
                name: None,
                classes: vec![],
                test_attr: None,
                text: String::new(),
                offset: 10,
            },
            ElementRecord {
                tag: "button".to_string(),
                id: Some("late".to_string()),
                name: None,
                classes: vec![],
                test_attr: None,
                text: String::new(),
                offset: 290,
            },
        ];
        let chunks = split_chunks("page.html", &text, &elements, &cfg(100, 150, 30)).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].selectors.len(), 1);
        assert_eq!(chunks[0].selectors[0].id.as_deref(), Some("early"));
        assert!(chunks[1].selectors.is_empty());
        assert_eq!(chunks[2].selectors[0].id.as_deref(), Some("late"));
    }
}
