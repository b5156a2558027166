//! lorebase CLI - ingest markdown docs, query the hybrid index, and render
//! budgeted context strings

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use lorebase::{
    format_context, Config, ContextBudget, HashEmbedder, KnowledgeBase, SearchOptions,
};

#[derive(Parser)]
#[command(name = "lorebase")]
#[command(about = "Local hybrid-retrieval knowledge base (BM25 + semantic)", long_about = None)]
#[command(version)]
struct Cli {
    /// SQLite database path (overrides config and RAG_DB_PATH)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest markdown files from a directory
    Ingest {
        /// Folder containing documents (default: config docs_dir)
        #[arg(long)]
        docs_dir: Option<PathBuf>,
        /// Glob pattern selecting files
        #[arg(long)]
        glob: Option<String>,
        /// Stored source_type label
        #[arg(long)]
        source_type: Option<String>,
        /// Do not delete existing chunks before re-ingesting
        #[arg(long)]
        no_refresh: bool,
    },
    /// Run a hybrid search and print the ranked results
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        keyword_weight: Option<f32>,
        #[arg(long)]
        semantic_weight: Option<f32>,
        /// JSON output
        #[arg(long)]
        json: bool,
    },
    /// Render the budgeted context string for a query
    Context {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        /// Character limit for the rendered context
        #[arg(long)]
        max_chars: Option<usize>,
    },
    /// Show store statistics
    Status {
        /// JSON output
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut config = Config::load(&cwd)?;
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }

    match cli.command {
        Commands::Ingest {
            docs_dir,
            glob,
            source_type,
            no_refresh,
        } => run_ingest(&config, docs_dir, glob, source_type, !no_refresh),
        Commands::Search {
            query,
            top_k,
            keyword_weight,
            semantic_weight,
            json,
        } => run_search(&config, &query, top_k, keyword_weight, semantic_weight, json),
        Commands::Context {
            query,
            top_k,
            max_chars,
        } => run_context(&config, &query, top_k, max_chars),
        Commands::Status { json } => run_status(&config, json),
    }
}

fn open_kb(config: &Config) -> Result<KnowledgeBase> {
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(KnowledgeBase::open(
        &config.db_path,
        Box::new(HashEmbedder::new()),
    )?)
}

fn search_options(
    config: &Config,
    top_k: Option<usize>,
    keyword_weight: Option<f32>,
    semantic_weight: Option<f32>,
) -> SearchOptions {
    SearchOptions {
        keyword_weight: keyword_weight.unwrap_or(config.search.keyword_weight),
        semantic_weight: semantic_weight.unwrap_or(config.search.semantic_weight),
        top_k: top_k.unwrap_or(config.search.top_k),
        candidate_k: config.search.candidate_k,
    }
}

fn run_ingest(
    config: &Config,
    docs_dir: Option<PathBuf>,
    glob: Option<String>,
    source_type: Option<String>,
    refresh: bool,
) -> Result<()> {
    let docs_dir = docs_dir.unwrap_or_else(|| config.docs_dir.clone());
    let glob = glob.unwrap_or_else(|| config.glob_pattern.clone());
    let source_type = source_type.unwrap_or_else(|| config.source_type.clone());

    let mut kb = open_kb(config)?;
    let stats = kb.ingest_markdown_dir(&docs_dir, &source_type, &glob, refresh)?;

    println!(
        "{} Ingested {} chunk(s) from {} file(s) into {}",
        "→".dimmed(),
        stats.chunks,
        stats.files,
        config.db_path.display()
    );
    if stats.failed > 0 {
        println!(
            "{} {} file(s) failed and were skipped",
            "!".yellow(),
            stats.failed
        );
    }
    Ok(())
}

fn run_search(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    keyword_weight: Option<f32>,
    semantic_weight: Option<f32>,
    json: bool,
) -> Result<()> {
    let kb = open_kb(config)?;
    let options = search_options(config, top_k, keyword_weight, semantic_weight);
    let results = kb.hybrid_search(query, &options)?;

    if json {
        let json_results: Vec<_> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "source_type": r.source_type,
                    "source_id": r.source_id,
                    "metadata": r.metadata,
                    "bm25_score": r.bm25_score,
                    "semantic_score": r.semantic_score,
                    "final_score": r.final_score,
                    "content": r.content,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json_results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("{} No results for: {}", "→".dimmed(), query.cyan());
        return Ok(());
    }

    println!(
        "{} {} result(s) for: {}",
        "→".dimmed(),
        results.len(),
        query.cyan()
    );
    println!();

    for (i, result) in results.iter().enumerate() {
        let section = result
            .metadata
            .get("section_title")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        println!(
            "{:>2}. {} {} (bm25 {:.2} | semantic {:.2} | final {:.2})",
            i + 1,
            result.source_id.bold(),
            section.dimmed(),
            result.bm25_score,
            result.semantic_score,
            result.final_score
        );
    }
    Ok(())
}

fn run_context(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    max_chars: Option<usize>,
) -> Result<()> {
    let kb = open_kb(config)?;
    let options = search_options(config, top_k, None, None);
    let results = kb.hybrid_search(query, &options)?;

    let budget = ContextBudget {
        max_chars: max_chars.unwrap_or(config.context.max_chars),
        min_entry_budget: config.context.min_entry_budget,
        entry_overhead: config.context.entry_overhead,
    };
    println!("{}", format_context(&results, &budget));
    Ok(())
}

fn run_status(config: &Config, json: bool) -> Result<()> {
    let kb = open_kb(config)?;
    let counts = kb.index_counts()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "db_path": config.db_path.display().to_string(),
                "embedder": kb.embedder_name(),
                "dimension": kb.dimension(),
                "chunks": counts.chunks,
                "vectors": counts.vectors,
                "fts_postings": counts.postings,
            }))?
        );
        return Ok(());
    }

    println!("{} Store: {}", "→".dimmed(), config.db_path.display());
    println!("  embedder:  {} ({}d)", kb.embedder_name(), kb.dimension());
    println!("  chunks:    {}", counts.chunks);
    println!("  vectors:   {}", counts.vectors);
    println!("  postings:  {}", counts.postings);

    if counts.chunks != counts.vectors || counts.chunks != counts.postings {
        println!(
            "{} projections out of sync; the store may be damaged",
            "!".red()
        );
    }
    Ok(())
}
