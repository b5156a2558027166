//! lorebase - local hybrid-retrieval knowledge base
//!
//! Markdown documents are chunked along `##` section boundaries, embedded,
//! and persisted in a single SQLite file holding three synchronized
//! projections per chunk: a metadata row, a packed-float vector, and an
//! FTS5 posting. Queries run BM25 keyword search and cosine vector search,
//! normalize both rankings onto [0, 1], fuse them with caller weights, and
//! can render the winners into a character-budgeted context string for
//! grounding downstream text generation.
//!
//! ```no_run
//! use lorebase::{format_context, ContextBudget, HashEmbedder, KnowledgeBase, SearchOptions};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut kb = KnowledgeBase::open("lorebase.db".as_ref(), Box::new(HashEmbedder::new()))?;
//! kb.ingest_markdown_dir("docs".as_ref(), "business_doc", "*.md", true)?;
//!
//! let results = kb.hybrid_search("pro plan pricing", &SearchOptions::default())?;
//! let context = format_context(&results, &ContextBudget::default());
//! # let _ = context;
//! # Ok(())
//! # }
//! ```

pub mod chunker;
pub mod config;
pub mod context;
pub mod embedder;
pub mod error;
pub mod fusion;
pub mod store;

pub use chunker::{chunk_markdown, DocChunk, Metadata};
pub use config::Config;
pub use context::{format_context, ContextBudget, NO_CONTEXT_SENTINEL};
pub use embedder::{Embedder, HashEmbedder, EMBEDDING_DIM};
pub use error::{KbError, Result};
pub use store::{IndexCounts, IngestStats, KnowledgeBase, SearchOptions, SearchResult};
