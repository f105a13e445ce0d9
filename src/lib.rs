//! # Grounding KB
//!
//! A document ingestion and grounded retrieval engine for
//! documentation-driven QA generation.
//!
//! Grounding KB turns heterogeneous documents (PDF, markdown, text, JSON,
//! HTML) into addressable, overlapping text chunks with structural
//! metadata, embeds and indexes them, retrieves the most relevant chunks
//! for a query, and validates that any structured artifact derived from
//! those chunks cites only documents actually retrieved.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │ Parsers  │──▶│   Pipeline    │──▶│  SQLite   │
//! │ 5 formats│   │ Chunk+Embed  │   │  vectors  │
//! └──────────┘   └──────────────┘   └─────┬─────┘
//!                                         │
//!                    ┌────────────────────┤
//!                    ▼                    ▼
//!              ┌───────────┐       ┌────────────┐
//!              │ Retriever │──────▶│ Grounding  │
//!              │ + context │       │ Validator  │
//!              └───────────┘       └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gkb build ./docs                  # rebuild the knowledge base
//! gkb query "free shipping rules"   # retrieve cited context
//! gkb validate cases.json --query "free shipping rules"
//! gkb selectors "pay now button"    # structural locator lookup
//! gkb stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`parse`] | Per-format text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index (SQLite and in-memory) |
//! | [`ingest`] | Per-document ingestion pipeline |
//! | [`retrieve`] | Context compilation with citations |
//! | [`grounding`] | Artifact grounding validation |
//! | [`selectors`] | Structural selector catalog |
//! | [`kb`] | Knowledge-base handle tying it together |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod grounding;
pub mod index;
pub mod ingest;
pub mod kb;
pub mod models;
pub mod parse;
pub mod retrieve;
pub mod selectors;
