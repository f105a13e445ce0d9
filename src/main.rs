//! # Grounding KB CLI (`gkb`)
//!
//! The `gkb` binary is the primary interface for the engine. It provides
//! commands for rebuilding the knowledge base, retrieving cited context,
//! validating generated artifacts, selector lookup, and statistics.
//!
//! ## Usage
//!
//! ```bash
//! gkb --config ./config/gkb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gkb build <dir>` | Rebuild the knowledge base from a directory |
//! | `gkb query "<text>"` | Retrieve context with citation tags |
//! | `gkb validate <file> --query "<text>"` | Validate an artifact's grounding |
//! | `gkb selectors "<hint>"` | Look up structural selectors by role |
//! | `gkb stats` | Show knowledge-base statistics |
//!
//! ## Examples
//!
//! ```bash
//! # Rebuild from a docs directory (format tags from file extensions)
//! gkb build ./docs --config ./config/gkb.toml
//!
//! # Retrieve the top 5 chunks for a prompt
//! gkb query "how does free shipping work" --k 5
//!
//! # Check generated test cases against the retrieved grounding set
//! gkb validate cases.json --query "how does free shipping work"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use walkdir::WalkDir;

use grounding_kb::config::{self, Config};
use grounding_kb::grounding::TestCase;
use grounding_kb::kb::{CancelToken, KnowledgeBase};
use grounding_kb::models::{DocFormat, SourceDocument};
use grounding_kb::retrieve::compile_context;

/// Grounding KB — a document ingestion and grounded retrieval engine for
/// documentation-driven QA generation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/gkb.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "gkb",
    about = "Grounding KB — document ingestion and grounded retrieval for QA generation",
    version,
    long_about = "Grounding KB turns heterogeneous documents into overlapping, embedded text \
    chunks, retrieves the most relevant chunks for a query as citation-tagged context, and \
    validates that generated artifacts cite only documents actually retrieved."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/gkb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Rebuild the knowledge base from a directory of documents.
    ///
    /// Walks the directory, declares each file's format from its extension
    /// (pdf, md, txt, json, html), and replaces the persisted store
    /// wholesale. Files whose format is unsupported are skipped. Ctrl-C
    /// aborts between documents without publishing a partial build.
    Build {
        /// Directory containing the source documents.
        dir: PathBuf,
    },

    /// Retrieve context for a query and print it with citation tags.
    ///
    /// Prints the compiled prompt context (each chunk under its
    /// `[source: <file>#<index>]` tag) followed by the grounding set.
    Query {
        /// Free-text prompt.
        query: String,
        /// Number of chunks to retrieve (default from config).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Validate a generated artifact against the grounding set for a query.
    ///
    /// The artifact file holds a JSON array of test cases (or a single
    /// object). The grounding set is recomputed by running the query, then
    /// every case is checked; rejections are reported with their reason.
    Validate {
        /// Path to the artifact JSON file.
        artifact: PathBuf,
        /// The query whose retrieval grounded the generation.
        #[arg(long)]
        query: String,
        /// Number of chunks to retrieve (default from config).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Look up structural selectors for a semantic role hint.
    Selectors {
        /// Role hint, e.g. "pay now button".
        hint: String,
        /// Maximum entries to print.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show knowledge-base statistics.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Build { dir } => run_build(config, &dir).await,
        Commands::Query { query, k } => run_query(config, &query, k).await,
        Commands::Validate { artifact, query, k } => {
            run_validate(config, &artifact, &query, k).await
        }
        Commands::Selectors { hint, limit } => run_selectors(config, &hint, limit).await,
        Commands::Stats => run_stats(config).await,
    }
}

async fn run_build(config: Config, dir: &Path) -> Result<()> {
    let (documents, unsupported) = collect_documents(dir)?;
    if documents.is_empty() {
        anyhow::bail!("no supported documents found in {}", dir.display());
    }

    let kb = KnowledgeBase::open(config).await?;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let summary = kb.rebuild(&documents, &cancel).await?;

    println!("build");
    println!("  documents ingested: {}", summary.document_count);
    println!("  chunks indexed: {}", summary.chunk_count);
    for (format, count) in &summary.per_format_counts {
        println!("  {}: {}", format, count);
    }
    if unsupported > 0 {
        println!("  skipped (unsupported format): {}", unsupported);
    }
    if !summary.errors.is_empty() {
        println!("  failed: {}", summary.errors.len());
        for err in &summary.errors {
            println!("    {}: {}", err.filename, err.reason);
        }
    }
    if summary.cancelled {
        println!("  cancelled — previous knowledge base left untouched");
    }
    println!("ok");
    Ok(())
}

async fn run_query(config: Config, query: &str, k: Option<usize>) -> Result<()> {
    let kb = KnowledgeBase::open(config).await?;
    let result = kb.retrieve(query, k).await?;

    if result.degraded {
        println!("index unavailable — run `gkb build` first");
    }

    let compiled = compile_context(&result);
    println!("{}", compiled.prompt);
    println!();
    println!("sources:");
    if compiled.grounding.is_empty() {
        println!("  (none)");
    }
    for document in compiled.grounding.iter() {
        println!("  {}", document);
    }
    Ok(())
}

async fn run_validate(config: Config, artifact: &Path, query: &str, k: Option<usize>) -> Result<()> {
    let content = std::fs::read_to_string(artifact)
        .with_context(|| format!("Failed to read artifact file: {}", artifact.display()))?;
    let cases: Vec<TestCase> = match serde_json::from_str::<Vec<TestCase>>(&content) {
        Ok(cases) => cases,
        Err(_) => vec![serde_json::from_str::<TestCase>(&content)
            .with_context(|| "artifact is neither a test-case array nor a single test case")?],
    };

    let kb = KnowledgeBase::open(config).await?;
    let result = kb.retrieve(query, k).await?;
    let compiled = compile_context(&result);

    let mut accepted = 0usize;
    let mut rejected = 0usize;

    println!("validate");
    for case in &cases {
        let outcome = kb.validate(case, &compiled.grounding);
        if outcome.is_accepted() {
            accepted += 1;
        } else {
            rejected += 1;
        }
        println!("  {}: {}", case.test_id, outcome);
    }
    println!("  accepted: {}", accepted);
    println!("  rejected: {}", rejected);
    println!("ok");
    Ok(())
}

async fn run_selectors(config: Config, hint: &str, limit: usize) -> Result<()> {
    let kb = KnowledgeBase::open(config).await?;
    let entries = kb.selectors_for(hint);

    if entries.is_empty() {
        println!("No selectors.");
        return Ok(());
    }

    for entry in entries.iter().take(limit) {
        println!("{:<10} {}", entry.kind.to_string(), entry.locator);
    }
    Ok(())
}

async fn run_stats(config: Config) -> Result<()> {
    let kb = KnowledgeBase::open(config).await?;
    let stats = kb.stats().await?;

    println!("stats");
    println!("  documents: {}", stats.document_count);
    println!("  chunks: {}", stats.chunk_count);
    println!("  selectors: {}", stats.selector_count);
    println!("  embedding model: {} ({} dims)", stats.model, stats.dims);
    if stats.rebuild_required {
        println!("  rebuild required: yes");
    }
    Ok(())
}

/// Walk a directory and turn every supported file into a [`SourceDocument`],
/// declaring the format from the extension. Returns the documents (sorted
/// by filename for deterministic batches) and the count of skipped files.
fn collect_documents(dir: &Path) -> Result<(Vec<SourceDocument>, usize)> {
    if !dir.exists() {
        anyhow::bail!("document directory does not exist: {}", dir.display());
    }

    let mut documents = Vec::new();
    let mut unsupported = 0usize;

    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(DocFormat::from_extension);

        let Some(format) = format else {
            unsupported += 1;
            continue;
        };

        let relative = path.strip_prefix(dir).unwrap_or(path);
        let filename = relative.to_string_lossy().replace('\\', "/");
        let content = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        documents.push(SourceDocument::new(filename, format, content));
    }

    documents.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok((documents, unsupported))
}
