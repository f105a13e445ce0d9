//! Per-format text extraction and structural metadata.
//!
//! Dispatch is by the declared [`DocFormat`] tag, never content sniffing.
//! HTML additionally yields a flat list of [`ElementRecord`]s for every
//! element that is interactive or carries a labeling attribute; JSON is
//! flattened into a path-prefixed pseudo-document so later chunking treats
//! it as prose.
//!
//! A parser that cannot decode its input fails with [`KbError::Parse`]
//! naming the document and format; the ingestion batch skips that one
//! document and proceeds.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::KbError;
use crate::models::{DocFormat, ElementRecord, SourceDocument};

/// Extraction result: plain text plus structural metadata for markup
/// formats (empty for everything but HTML).
#[derive(Debug, Default)]
pub struct Parsed {
    pub text: String,
    pub elements: Vec<ElementRecord>,
}

/// Extract text (and structure) from a document according to its declared
/// format tag.
pub fn parse_document(doc: &SourceDocument) -> Result<Parsed, KbError> {
    let parsed = match doc.format {
        DocFormat::Pdf => parse_pdf(&doc.content),
        DocFormat::Markdown => decode_utf8(&doc.content).map(|s| Parsed {
            text: strip_markdown(&s),
            elements: Vec::new(),
        }),
        DocFormat::Text => decode_utf8(&doc.content).map(|text| Parsed {
            text,
            elements: Vec::new(),
        }),
        DocFormat::Json => decode_utf8(&doc.content).and_then(|s| parse_json(&s)),
        DocFormat::Html => decode_utf8(&doc.content).map(|s| parse_html(&s)),
    };

    parsed.map_err(|reason| KbError::Parse {
        document: doc.filename.clone(),
        format: doc.format,
        reason,
    })
}

fn decode_utf8(bytes: &[u8]) -> Result<String, String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| e.to_string())
}

fn parse_pdf(bytes: &[u8]) -> Result<Parsed, String> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| e.to_string())?;
    Ok(Parsed {
        text,
        elements: Vec::new(),
    })
}

// ============ Markdown ============

/// Reduce markdown source to plain text: drop heading/list/quote prefixes,
/// fence markers, emphasis runs, and link syntax. Code inside fences is
/// kept verbatim.
fn strip_markdown(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut in_fence = false;

    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            out.push_str(line);
            out.push('\n');
            continue;
        }
        out.push_str(&strip_inline(strip_block_prefix(trimmed)));
        out.push('\n');
    }

    out
}

fn strip_block_prefix(line: &str) -> &str {
    let rest = line.trim_start_matches('#');
    if rest.len() < line.len() {
        return rest.trim_start();
    }
    for prefix in ["> ", "- ", "* ", "+ "] {
        if let Some(rest) = line.strip_prefix(prefix) {
            return rest;
        }
    }
    line
}

fn strip_inline(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' | '_' | '`' => {}
            '!' if chars.peek() == Some(&'[') => {}
            '[' => {
                // Link: emit the label, skip the target.
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                    out.push(inner);
                }
                if chars.peek() == Some(&'(') {
                    for inner in chars.by_ref() {
                        if inner == ')' {
                            break;
                        }
                    }
                }
            }
            other => out.push(other),
        }
    }

    out
}

// ============ JSON ============

/// Type tag carried by each flattened JSON record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

/// One record of the flattened JSON walk: dotted/indexed path, rendered
/// scalar value (empty for containers), and type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonEntry {
    pub path: String,
    pub value: String,
    pub kind: JsonKind,
}

fn parse_json(content: &str) -> Result<Parsed, String> {
    let value: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let entries = flatten_json(&value);
    Ok(Parsed {
        text: render_entries(&entries),
        elements: Vec::new(),
    })
}

/// Typed recursive walk producing a fixed record per node. Scalars carry
/// their rendered value; container records mark structure. Array elements
/// use `path[idx]`, object members `path.key`.
pub fn flatten_json(value: &serde_json::Value) -> Vec<JsonEntry> {
    let mut entries = Vec::new();
    walk_json(value, "", true, &mut entries);
    entries
}

fn walk_json(value: &serde_json::Value, path: &str, labeled: bool, out: &mut Vec<JsonEntry>) {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            if labeled && !path.is_empty() {
                out.push(JsonEntry {
                    path: path.to_string(),
                    value: String::new(),
                    kind: JsonKind::Object,
                });
            }
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                walk_json(child, &child_path, true, out);
            }
        }
        Value::Array(items) => {
            if labeled && !path.is_empty() {
                out.push(JsonEntry {
                    path: path.to_string(),
                    value: String::new(),
                    kind: JsonKind::Array,
                });
            }
            for (idx, item) in items.iter().enumerate() {
                let child_path = format!("{}[{}]", path, idx);
                // Containers nested in arrays contribute no line of their own.
                walk_json(item, &child_path, false, out);
            }
        }
        scalar => {
            let (value, kind) = match scalar {
                Value::Null => ("null".to_string(), JsonKind::Null),
                Value::Bool(b) => (b.to_string(), JsonKind::Bool),
                Value::Number(n) => (n.to_string(), JsonKind::Number),
                Value::String(s) => (s.clone(), JsonKind::String),
                _ => unreachable!(),
            };
            out.push(JsonEntry {
                path: path.to_string(),
                value,
                kind,
            });
        }
    }
}

fn render_entries(entries: &[JsonEntry]) -> String {
    entries
        .iter()
        .map(|e| match e.kind {
            JsonKind::Object | JsonKind::Array => format!("{}:", e.path),
            _ if e.path.is_empty() => e.value.clone(),
            _ => format!("{}: {}", e.path, e.value),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============ HTML ============

/// Tags considered interactive even without labeling attributes.
const INTERACTIVE_TAGS: &[&str] = &["button", "input", "select", "textarea", "form", "a"];

/// How many chars of following text are attributed to an element.
const ELEMENT_TEXT_WINDOW: usize = 80;

/// Lenient event scan over HTML: extracts visible text (newline-separated,
/// script/style skipped) and one [`ElementRecord`] per interactive or
/// labeled element. Malformed markup stops the scan at the bad event and
/// keeps what was extracted so far.
fn parse_html(content: &str) -> Parsed {
    let mut reader = Reader::from_str(content);
    let config = reader.config_mut();
    config.trim_text(true);
    config.check_end_names = false;

    let mut text = String::new();
    let mut text_chars = 0usize;
    let mut elements: Vec<ElementRecord> = Vec::new();
    let mut skip_depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                if tag == "script" || tag == "style" {
                    skip_depth += 1;
                    continue;
                }
                if let Some(record) = element_record(&tag, &e, text_chars) {
                    elements.push(record);
                }
            }
            Ok(Event::Empty(e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                if let Some(record) = element_record(&tag, &e, text_chars) {
                    elements.push(record);
                }
            }
            Ok(Event::End(e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                if (tag == "script" || tag == "style") && skip_depth > 0 {
                    skip_depth -= 1;
                }
            }
            Ok(Event::Text(t)) => {
                if skip_depth > 0 {
                    continue;
                }
                let piece = t.unescape().unwrap_or_default();
                let piece = piece.trim();
                if piece.is_empty() {
                    continue;
                }
                if !text.is_empty() {
                    text.push('\n');
                    text_chars += 1;
                }
                text.push_str(piece);
                text_chars += piece.chars().count();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => break,
        }
    }

    // Attribute the text that follows each element's position to it.
    let all_chars: Vec<char> = text.chars().collect();
    for record in &mut elements {
        let start = record.offset.min(all_chars.len());
        let end = (start + ELEMENT_TEXT_WINDOW).min(all_chars.len());
        let nearby: String = all_chars[start..end].iter().collect();
        record.text = nearby
            .trim_start()
            .lines()
            .next()
            .unwrap_or_default()
            .trim_end()
            .to_string();
    }

    Parsed { text, elements }
}

fn element_record(
    tag: &str,
    e: &quick_xml::events::BytesStart<'_>,
    offset: usize,
) -> Option<ElementRecord> {
    let mut id = None;
    let mut name = None;
    let mut classes = Vec::new();
    let mut test_attr = None;

    for attr in e.attributes().with_checks(false).flatten() {
        let key = attr.key.as_ref();
        let value = attr.unescape_value().unwrap_or_default().to_string();
        match key {
            b"id" => id = Some(value),
            b"name" => name = Some(value),
            b"class" => classes = value.split_whitespace().map(str::to_string).collect(),
            b"data-test" => test_attr = Some(value),
            _ => {}
        }
    }

    let interactive = INTERACTIVE_TAGS.contains(&tag);
    let labeled = id.is_some() || name.is_some() || test_attr.is_some();
    if !interactive && !labeled {
        return None;
    }

    Some(ElementRecord {
        tag: tag.to_string(),
        id,
        name,
        classes,
        test_attr,
        text: String::new(),
        offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(filename: &str, format: DocFormat, content: &str) -> SourceDocument {
        SourceDocument::new(filename, format, content.as_bytes().to_vec())
    }

    #[test]
    fn text_passes_through() {
        let parsed = parse_document(&doc("notes.txt", DocFormat::Text, "plain body")).unwrap();
        assert_eq!(parsed.text, "plain body");
        assert!(parsed.elements.is_empty());
    }

    #[test]
    fn invalid_utf8_is_a_parse_error() {
        let bad = SourceDocument::new("notes.txt", DocFormat::Text, vec![0xff, 0xfe, 0x00]);
        let err = parse_document(&bad).unwrap_err();
        assert!(matches!(err, KbError::Parse { .. }));
        assert!(err.to_string().contains("notes.txt"));
    }

    #[test]
    fn invalid_pdf_is_a_parse_error() {
        let bad = SourceDocument::new("manual.pdf", DocFormat::Pdf, b"not a pdf".to_vec());
        let err = parse_document(&bad).unwrap_err();
        assert!(err.to_string().contains("pdf"));
    }

    #[test]
    fn markdown_loses_heading_and_emphasis_markers() {
        let parsed = parse_document(&doc(
            "guide.md",
            DocFormat::Markdown,
            "# Checkout\n\nPay with *credit card* or [PayPal](https://pay.example).",
        ))
        .unwrap();
        assert!(parsed.text.contains("Checkout"));
        assert!(parsed.text.contains("Pay with credit card or PayPal."));
        assert!(!parsed.text.contains('#'));
        assert!(!parsed.text.contains("https://pay.example"));
    }

    #[test]
    fn json_flattens_to_path_prefixed_lines() {
        let parsed = parse_document(&doc(
            "api.json",
            DocFormat::Json,
            r#"{"cart": {"max_items": 10, "tiers": ["basic", "pro"]}}"#,
        ))
        .unwrap();
        assert!(parsed.text.contains("cart:"));
        assert!(parsed.text.contains("cart.max_items: 10"));
        assert!(parsed.text.contains("cart.tiers[0]: basic"));
        assert!(parsed.text.contains("cart.tiers[1]: pro"));
    }

    #[test]
    fn json_entries_carry_type_tags() {
        let value: serde_json::Value =
            serde_json::from_str(r#"{"a": null, "b": true, "c": [1]}"#).unwrap();
        let entries = flatten_json(&value);
        let kinds: Vec<JsonKind> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![JsonKind::Null, JsonKind::Bool, JsonKind::Array, JsonKind::Number]
        );
        assert_eq!(entries[3].path, "c[0]");
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let err = parse_document(&doc("api.json", DocFormat::Json, "{nope")).unwrap_err();
        assert!(matches!(err, KbError::Parse { .. }));
    }

    #[test]
    fn html_yields_text_and_element_records() {
        let html = r#"<html><body>
            <h1>Checkout</h1>
            <button id="pay-now-btn" class="btn-green">Pay now</button>
            <input name="coupon_code" data-test="coupon-input"/>
            <script>ignore_me();</script>
        </body></html>"#;
        let parsed = parse_document(&doc("checkout.html", DocFormat::Html, html)).unwrap();

        assert!(parsed.text.contains("Checkout"));
        assert!(parsed.text.contains("Pay now"));
        assert!(!parsed.text.contains("ignore_me"));

        let button = parsed
            .elements
            .iter()
            .find(|e| e.id.as_deref() == Some("pay-now-btn"))
            .unwrap();
        assert_eq!(button.tag, "button");
        assert_eq!(button.classes, vec!["btn-green"]);
        assert_eq!(button.text, "Pay now");

        let input = parsed
            .elements
            .iter()
            .find(|e| e.name.as_deref() == Some("coupon_code"))
            .unwrap();
        assert_eq!(input.test_attr.as_deref(), Some("coupon-input"));
    }

    #[test]
    fn html_element_offsets_follow_extracted_text() {
        let html = "<div><p>Intro line</p><button id=\"go\">Go</button></div>";
        let parsed = parse_document(&doc("page.html", DocFormat::Html, html)).unwrap();
        let button = parsed.elements.iter().find(|e| e.tag == "button").unwrap();
        // The button is recorded at the end of the text seen so far.
        assert_eq!(button.offset, "Intro line".chars().count());
        assert_eq!(button.text, "Go");
    }
}
