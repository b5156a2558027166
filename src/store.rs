//! The knowledge base store: one SQLite file, three synchronized projections
//!
//! Every chunk lives as (a) a metadata row in `chunks`, (b) a packed-float
//! vector in `chunk_vectors`, and (c) an FTS5 posting in `chunks_fts`, all
//! keyed by the same id. The three are written and deleted inside a single
//! transaction per operation, so search never observes a chunk with a
//! missing projection, even across a crash mid-ingest.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::chunker::{chunk_markdown, Metadata};
use crate::embedder::Embedder;
use crate::error::{KbError, Result};
use crate::fusion;

/// One hybrid-search hit, hydrated with the chunk's stored fields.
/// Scores are normalized to [0, 1] before fusion.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: i64,
    pub content: String,
    pub source_type: String,
    pub source_id: String,
    pub metadata: Metadata,
    pub bm25_score: f32,
    pub semantic_score: f32,
    pub final_score: f32,
}

/// Weights and limits for one hybrid query. Weights need not sum to 1.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub keyword_weight: f32,
    pub semantic_weight: f32,
    pub top_k: usize,
    pub candidate_k: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            keyword_weight: 0.5,
            semantic_weight: 0.5,
            top_k: 10,
            candidate_k: 100,
        }
    }
}

/// Outcome of a directory ingestion run. `failed` counts files that were
/// skipped after an error; the rest of the run continues without them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub files: usize,
    pub chunks: usize,
    pub failed: usize,
}

/// Row counts of the three projections; equal by invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCounts {
    pub chunks: i64,
    pub vectors: i64,
    pub postings: i64,
}

struct ChunkMeta {
    content: String,
    source_type: String,
    source_id: String,
    metadata: Metadata,
}

/// Local hybrid-retrieval knowledge base over a single SQLite file.
///
/// Owns the connection and the embedder; there is no global state. The
/// store pins its embedding dimension at creation and refuses to open with
/// an embedder of a different width.
pub struct KnowledgeBase {
    conn: Connection,
    embedder: Box<dyn Embedder>,
    dim: usize,
}

impl KnowledgeBase {
    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: &Path, embedder: Box<dyn Embedder>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::init(conn, embedder)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory(embedder: Box<dyn Embedder>) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, embedder)
    }

    fn init(conn: Connection, embedder: Box<dyn Embedder>) -> Result<Self> {
        let dim = embedder.dimension();
        let kb = Self { conn, embedder, dim };
        kb.init_schema()?;
        kb.pin_dimension()?;
        Ok(kb)
    }

    /// Create the three projections. No SQL triggers: the FTS table is kept
    /// in lockstep by the explicit write paths below.
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_type TEXT NOT NULL,
                source_id TEXT,
                content TEXT NOT NULL,
                metadata TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_source
                ON chunks(source_type, source_id);

            CREATE TABLE IF NOT EXISTS chunk_vectors (
                id INTEGER PRIMARY KEY REFERENCES chunks(id),
                embedding BLOB NOT NULL
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                content,
                source_type,
                source_id
            );

            CREATE TABLE IF NOT EXISTS kb_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    /// Record the embedding width on first open; reject a mismatched
    /// embedder afterwards. A store embedded at one width is unreadable at
    /// another, so this fails loudly instead of returning garbage ranks.
    fn pin_dimension(&self) -> Result<()> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM kb_meta WHERE key = 'embedding_dim'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match stored.and_then(|s| s.parse::<usize>().ok()) {
            Some(pinned) if pinned != self.dim => Err(KbError::DimensionMismatch {
                expected: pinned,
                actual: self.dim,
            }),
            Some(_) => Ok(()),
            None => {
                self.conn.execute(
                    "INSERT INTO kb_meta (key, value) VALUES ('embedding_dim', ?1)",
                    params![self.dim.to_string()],
                )?;
                Ok(())
            }
        }
    }

    /// Embedding dimension this store is pinned to
    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    pub fn chunk_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Row counts of all three projections, for status output and the
    /// consistency checks in tests.
    pub fn index_counts(&self) -> Result<IndexCounts> {
        let chunks = self.chunk_count()?;
        let vectors =
            self.conn
                .query_row("SELECT COUNT(*) FROM chunk_vectors", [], |row| row.get(0))?;
        let postings =
            self.conn
                .query_row("SELECT COUNT(*) FROM chunks_fts", [], |row| row.get(0))?;
        Ok(IndexCounts {
            chunks,
            vectors,
            postings,
        })
    }

    // ------------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------------

    /// Chunk one document, embed every chunk, and persist each chunk's three
    /// projections in its own transaction. Returns the assigned ids.
    ///
    /// `extra_metadata` entries are merged into every chunk's metadata, with
    /// the chunk's own keys winning on conflict. An embedding failure aborts
    /// the whole call before anything is written; a persistence failure
    /// rolls back the chunk it hit.
    pub fn ingest_document(
        &mut self,
        content: &str,
        source_id: &str,
        source_type: &str,
        extra_metadata: Option<&Metadata>,
    ) -> Result<Vec<i64>> {
        let chunks = chunk_markdown(content, source_id);
        if chunks.is_empty() {
            debug!(source_id, "document empty after trimming, nothing to ingest");
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .map_err(KbError::Embedding)?;

        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(&embeddings) {
            let mut metadata = extra_metadata.cloned().unwrap_or_default();
            for (key, value) in &chunk.metadata {
                metadata.insert(key.clone(), value.clone());
            }

            ids.push(self.save_chunk(
                source_type,
                source_id,
                &chunk.content,
                &metadata,
                embedding,
            )?);
        }

        debug!(source_id, chunks = ids.len(), "document ingested");
        Ok(ids)
    }

    /// Insert metadata row, vector, and FTS posting under one transaction.
    /// The metadata insert runs first so its assigned rowid keys the other
    /// two projections.
    fn save_chunk(
        &mut self,
        source_type: &str,
        source_id: &str,
        content: &str,
        metadata: &Metadata,
        embedding: &[f32],
    ) -> Result<i64> {
        if embedding.len() != self.dim {
            return Err(KbError::DimensionMismatch {
                expected: self.dim,
                actual: embedding.len(),
            });
        }

        let metadata_json = serde_json::to_string(metadata)?;
        let created_at = Utc::now().to_rfc3339();

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO chunks (source_type, source_id, content, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![source_type, source_id, content, metadata_json, created_at],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO chunk_vectors (id, embedding) VALUES (?1, ?2)",
            params![id, embedding_to_bytes(embedding)],
        )?;
        tx.execute(
            "INSERT INTO chunks_fts (rowid, content, source_type, source_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, content, source_type, source_id],
        )?;
        tx.commit()?;

        Ok(id)
    }

    /// Remove every chunk of `(source_type, source_id)` from all three
    /// projections in one transaction. Returns the number removed.
    pub fn delete_source(&mut self, source_type: &str, source_id: &str) -> Result<usize> {
        let tx = self.conn.transaction()?;

        let ids: Vec<i64> = {
            let mut stmt =
                tx.prepare("SELECT id FROM chunks WHERE source_type = ?1 AND source_id = ?2")?;
            let rows = stmt.query_map(params![source_type, source_id], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        tx.execute(
            &format!("DELETE FROM chunks WHERE id IN ({placeholders})"),
            params_from_iter(ids.iter()),
        )?;
        tx.execute(
            &format!("DELETE FROM chunk_vectors WHERE id IN ({placeholders})"),
            params_from_iter(ids.iter()),
        )?;
        tx.execute(
            &format!("DELETE FROM chunks_fts WHERE rowid IN ({placeholders})"),
            params_from_iter(ids.iter()),
        )?;
        tx.commit()?;

        debug!(source_type, source_id, removed = ids.len(), "source deleted");
        Ok(ids.len())
    }

    /// Ingest every file matching `glob_pattern` under `docs_dir`, in
    /// lexicographic order. With `refresh`, each file's existing chunks are
    /// deleted first, so re-running over the same files is idempotent.
    ///
    /// A failing file is logged, counted in `failed`, and skipped; the rest
    /// of the run continues.
    pub fn ingest_markdown_dir(
        &mut self,
        docs_dir: &Path,
        source_type: &str,
        glob_pattern: &str,
        refresh: bool,
    ) -> Result<IngestStats> {
        let pattern = docs_dir.join(glob_pattern);
        let mut paths: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())?
            .filter_map(|entry| entry.ok())
            .collect();
        paths.sort();

        let mut stats = IngestStats::default();
        for path in paths {
            let source_id = match path.file_name() {
                Some(name) => name.to_string_lossy().to_string(),
                None => continue,
            };

            match self.ingest_file(&path, &source_id, source_type, refresh) {
                Ok(count) => {
                    stats.files += 1;
                    stats.chunks += count;
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping file after ingestion failure");
                    stats.failed += 1;
                }
            }
        }

        info!(
            files = stats.files,
            chunks = stats.chunks,
            failed = stats.failed,
            "directory ingestion finished"
        );
        Ok(stats)
    }

    fn ingest_file(
        &mut self,
        path: &Path,
        source_id: &str,
        source_type: &str,
        refresh: bool,
    ) -> Result<usize> {
        let content = fs::read_to_string(path)?;
        if refresh {
            self.delete_source(source_type, source_id)?;
        }
        Ok(self
            .ingest_document(&content, source_id, source_type, None)?
            .len())
    }

    // ------------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------------

    /// BM25 keyword search. Raw FTS5 `bm25()` scores, where lower (more
    /// negative) is better. Query tokens are quoted before `MATCH`, and any
    /// residual FTS syntax error degrades to an empty map rather than
    /// failing the query.
    pub fn bm25_search(&self, query: &str, limit: usize) -> Result<HashMap<i64, f32>> {
        let safe_query = escape_fts_query(query);
        if safe_query.is_empty() {
            return Ok(HashMap::new());
        }

        let mut stmt = self.conn.prepare(
            "SELECT rowid, bm25(chunks_fts) FROM chunks_fts WHERE chunks_fts MATCH ?1 LIMIT ?2",
        )?;
        let rows: rusqlite::Result<Vec<(i64, f64)>> = stmt
            .query_map(params![safe_query, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .and_then(|mapped| mapped.collect());

        match rows {
            Ok(rows) => Ok(rows.into_iter().map(|(id, s)| (id, s as f32)).collect()),
            Err(rusqlite::Error::SqliteFailure(_, message)) => {
                debug!(query, ?message, "FTS rejected query, treating as no matches");
                Ok(HashMap::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cosine-distance search over the vector table. Returns up to `limit`
    /// nearest chunks as id → distance in [0, 2]; distance ties keep table
    /// order (id ascending) via the stable sort.
    pub fn semantic_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<HashMap<i64, f32>> {
        if query_embedding.len() != self.dim {
            return Err(KbError::DimensionMismatch {
                expected: self.dim,
                actual: query_embedding.len(),
            });
        }

        let mut stmt = self
            .conn
            .prepare("SELECT id, embedding FROM chunk_vectors ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut scored: Vec<(i64, f32)> = Vec::new();
        for row in rows {
            let (id, blob) = row?;
            let stored = bytes_to_embedding(&blob);
            if stored.len() != self.dim {
                return Err(KbError::DimensionMismatch {
                    expected: self.dim,
                    actual: stored.len(),
                });
            }
            scored.push((id, cosine_distance(query_embedding, &stored)));
        }

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored.into_iter().collect())
    }

    /// Hybrid search: embed the query, gather `candidate_k` results from
    /// both rankings, normalize, fuse with the caller's weights, and
    /// hydrate the top `top_k`. An empty store or no matches yields an
    /// empty vector.
    pub fn hybrid_search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embedder.embed(query).map_err(KbError::Embedding)?;

        let bm25_raw = self.bm25_search(query, options.candidate_k)?;
        let semantic_raw = self.semantic_search(&query_embedding, options.candidate_k)?;

        let bm25_norm = fusion::normalize_bm25(&bm25_raw);
        let semantic_norm = fusion::normalize_distances(&semantic_raw);

        let mut fused = fusion::fuse(
            &bm25_norm,
            &semantic_norm,
            options.keyword_weight,
            options.semantic_weight,
        );
        fused.truncate(options.top_k);
        if fused.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = fused.iter().map(|(id, _)| *id).collect();
        let mut meta = self.meta_by_ids(&ids)?;

        Ok(fused
            .into_iter()
            .filter_map(|(id, score)| {
                meta.remove(&id).map(|m| SearchResult {
                    id,
                    content: m.content,
                    source_type: m.source_type,
                    source_id: m.source_id,
                    metadata: m.metadata,
                    bm25_score: score.bm25,
                    semantic_score: score.semantic,
                    final_score: score.final_score,
                })
            })
            .collect())
    }

    fn meta_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, ChunkMeta>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, source_type, source_id, content, metadata
             FROM chunks WHERE id IN ({placeholders})"
        ))?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut out = HashMap::with_capacity(ids.len());
        for row in rows {
            let (id, source_type, source_id, content, metadata) = row?;
            let metadata = match metadata {
                Some(raw) => serde_json::from_str(&raw)?,
                None => Metadata::new(),
            };
            out.insert(
                id,
                ChunkMeta {
                    content,
                    source_type,
                    source_id: source_id.unwrap_or_default(),
                    metadata,
                },
            );
        }
        Ok(out)
    }
}

/// Quote every token so FTS operator syntax (`AND`, `*`, `(`, `"` ...) is
/// matched literally instead of parsed.
fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            let mut arr = [0u8; 4];
            arr.copy_from_slice(chunk);
            f32::from_le_bytes(arr)
        })
        .collect()
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use anyhow::anyhow;

    fn kb() -> KnowledgeBase {
        KnowledgeBase::open_in_memory(Box::new(HashEmbedder::new())).unwrap()
    }

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Err(anyhow!("model backend unreachable"))
        }

        fn dimension(&self) -> usize {
            384
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_ingest_keeps_projections_in_lockstep() {
        let mut kb = kb();
        let doc = "# Pricing\n\n## Basic\nCheap plan.\n\n## Pro\nFull plan.\n";
        let ids = kb.ingest_document(doc, "pricing.md", "business_doc", None).unwrap();

        assert_eq!(ids.len(), 2);
        let counts = kb.index_counts().unwrap();
        assert_eq!(counts.chunks, 2);
        assert_eq!(counts.vectors, 2);
        assert_eq!(counts.postings, 2);
    }

    #[test]
    fn test_ingest_empty_document_is_noop() {
        let mut kb = kb();
        let ids = kb.ingest_document("   \n", "empty.md", "business_doc", None).unwrap();
        assert!(ids.is_empty());
        assert_eq!(kb.chunk_count().unwrap(), 0);
    }

    #[test]
    fn test_embedding_failure_surfaces_and_writes_nothing() {
        let mut kb = KnowledgeBase::open_in_memory(Box::new(FailingEmbedder)).unwrap();
        let err = kb
            .ingest_document("# Doc\n\nBody.", "doc.md", "business_doc", None)
            .unwrap_err();

        assert!(matches!(err, KbError::Embedding(_)));
        assert_eq!(kb.chunk_count().unwrap(), 0);
    }

    #[test]
    fn test_delete_source_removes_all_projections() {
        let mut kb = kb();
        kb.ingest_document("# A\n\n## One\nx\n\n## Two\ny", "a.md", "business_doc", None)
            .unwrap();
        kb.ingest_document("# B\n\n## Three\nz", "b.md", "business_doc", None)
            .unwrap();

        let removed = kb.delete_source("business_doc", "a.md").unwrap();
        assert_eq!(removed, 2);

        let counts = kb.index_counts().unwrap();
        assert_eq!(counts.chunks, 1);
        assert_eq!(counts.vectors, 1);
        assert_eq!(counts.postings, 1);

        // Deleted chunks are invisible to both rankings
        assert!(kb.bm25_search("One", 10).unwrap().is_empty());
    }

    #[test]
    fn test_delete_missing_source_returns_zero() {
        let mut kb = kb();
        assert_eq!(kb.delete_source("business_doc", "ghost.md").unwrap(), 0);
    }

    #[test]
    fn test_bm25_search_finds_lexical_match() {
        let mut kb = kb();
        let ids = kb
            .ingest_document(
                "# Policies\n\n## Refunds\nFull refund within thirty days.\n\n## Shipping\nShips in two days.",
                "policies.md",
                "business_doc",
                None,
            )
            .unwrap();

        let scores = kb.bm25_search("refund", 10).unwrap();
        assert_eq!(scores.len(), 1);
        assert!(scores.contains_key(&ids[0]));
        // FTS5 bm25() is lower-is-better and negative for a match
        assert!(scores[&ids[0]] < 0.0);
    }

    #[test]
    fn test_bm25_search_operator_syntax_degrades_to_empty() {
        let mut kb = kb();
        kb.ingest_document("# Doc\n\nSome body text.", "doc.md", "business_doc", None)
            .unwrap();

        for query in ["AND OR NOT", "(unbalanced", "wild*card\"", "  "] {
            let scores = kb.bm25_search(query, 10).unwrap();
            assert!(scores.is_empty(), "query {query:?} should match nothing");
        }
    }

    #[test]
    fn test_semantic_search_rejects_wrong_dimension() {
        let kb = kb();
        let err = kb.semantic_search(&[0.0; 16], 10).unwrap_err();
        assert!(matches!(
            err,
            KbError::DimensionMismatch { expected: 384, actual: 16 }
        ));
    }

    #[test]
    fn test_semantic_search_ranks_by_distance() {
        let mut kb = kb();
        kb.ingest_document(
            "# Plans\n\n## Pro\npro plan price fifty dollars\n\n## Support\nemail us any time",
            "plans.md",
            "business_doc",
            None,
        )
        .unwrap();

        let embedder = HashEmbedder::new();
        let query = embedder.embed("pro plan price").unwrap();
        let distances = kb.semantic_search(&query, 10).unwrap();

        assert_eq!(distances.len(), 2);
        for &d in distances.values() {
            assert!((0.0..=2.0).contains(&d));
        }
        let pro = distances.values().cloned().fold(f32::INFINITY, f32::min);
        let support = distances.values().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert!(pro < support);
    }

    #[test]
    fn test_semantic_search_limit() {
        let mut kb = kb();
        kb.ingest_document(
            "# Doc\n\n## A\naaa\n\n## B\nbbb\n\n## C\nccc",
            "doc.md",
            "business_doc",
            None,
        )
        .unwrap();

        let query = HashEmbedder::new().embed("aaa").unwrap();
        assert_eq!(kb.semantic_search(&query, 2).unwrap().len(), 2);
    }

    #[test]
    fn test_hybrid_search_empty_store() {
        let kb = kb();
        let results = kb.hybrid_search("anything", &SearchOptions::default()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_hybrid_search_hydrates_fields() {
        let mut kb = kb();
        kb.ingest_document(
            "# Pricing\n\n## Pro\nThe pro plan price is fifty dollars per month.",
            "pricing.md",
            "business_doc",
            None,
        )
        .unwrap();

        let results = kb.hybrid_search("pro plan price", &SearchOptions::default()).unwrap();
        assert_eq!(results.len(), 1);

        let top = &results[0];
        assert_eq!(top.source_type, "business_doc");
        assert_eq!(top.source_id, "pricing.md");
        assert!(top.content.starts_with("[From: pricing.md]\n# Pricing"));
        assert_eq!(top.metadata["section_title"], "Pro");
        assert!(top.final_score > 0.0);
        assert!((0.0..=1.0).contains(&top.bm25_score));
        assert!((0.0..=1.0).contains(&top.semantic_score));
    }

    #[test]
    fn test_hybrid_search_top_k_truncation() {
        let mut kb = kb();
        kb.ingest_document(
            "# Doc\n\n## A\nplan a\n\n## B\nplan b\n\n## C\nplan c\n\n## D\nplan d",
            "doc.md",
            "business_doc",
            None,
        )
        .unwrap();

        let options = SearchOptions {
            top_k: 2,
            ..Default::default()
        };
        let results = kb.hybrid_search("plan", &options).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_metadata_round_trips_exactly() {
        let mut kb = kb();
        kb.ingest_document("# T\n\n## Sec One\nbody", "t.md", "business_doc", None)
            .unwrap();

        let results = kb.hybrid_search("body", &SearchOptions::default()).unwrap();
        let metadata = &results[0].metadata;
        assert_eq!(metadata["source_file"], "t.md");
        assert_eq!(metadata["section_title"], "Sec One");
    }

    #[test]
    fn test_extra_metadata_is_merged() {
        let mut kb = kb();
        let mut extra = Metadata::new();
        extra.insert("team".into(), serde_json::json!("billing"));
        extra.insert("source_file".into(), serde_json::json!("overridden.md"));
        kb.ingest_document("# T\n\n## Sec\nbody", "t.md", "business_doc", Some(&extra))
            .unwrap();

        let results = kb.hybrid_search("body", &SearchOptions::default()).unwrap();
        let metadata = &results[0].metadata;
        assert_eq!(metadata["team"], "billing");
        // chunk-derived keys win over caller-supplied ones
        assert_eq!(metadata["source_file"], "t.md");
        assert_eq!(metadata["section_title"], "Sec");
    }

    #[test]
    fn test_created_at_is_set() {
        let mut kb = kb();
        kb.ingest_document("# T\n\nbody", "t.md", "business_doc", None).unwrap();

        let created_at: String = kb
            .conn
            .query_row("SELECT created_at FROM chunks LIMIT 1", [], |row| row.get(0))
            .unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&created_at).is_ok());
    }

    #[test]
    fn test_escape_fts_query() {
        assert_eq!(escape_fts_query("pro plan"), "\"pro\" \"plan\"");
        assert_eq!(escape_fts_query("say \"hi\""), "\"say\" \"\"\"hi\"\"\"");
        assert_eq!(escape_fts_query("  "), "");
    }

    #[test]
    fn test_embedding_blob_round_trip() {
        let original = vec![0.1f32, -2.5, 3.25, 0.0];
        let bytes = embedding_to_bytes(&original);
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes_to_embedding(&bytes), original);
    }

    #[test]
    fn test_cosine_distance_bounds() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        let c = [-1.0f32, 0.0];

        assert!(cosine_distance(&a, &a).abs() < 1e-6);
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&a, &c) - 2.0).abs() < 1e-6);
        // Zero vector falls back to the neutral midpoint
        assert_eq!(cosine_distance(&a, &[0.0, 0.0]), 1.0);
    }
}
