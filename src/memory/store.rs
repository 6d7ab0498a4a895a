//! `PaperStore` — persistent paper + chunk index with text and vector search.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, params};
use sha2::{Digest, Sha256};

use crate::error::AppError;

const MEMORY_DIR: &str = "memory";
const PAPERS_DIR: &str = "papers";
const DB_FILENAME: &str = "chunks.db";

/// Schema version stored in `PRAGMA user_version`.
/// Increment when the DDL changes; add a migration path in `init_db`.
const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone)]
pub struct PaperStore {
    dir: PathBuf,
    papers_dir: PathBuf,
    db_path: PathBuf,
}

/// A paper being added: full text plus descriptive metadata.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Paper {
    pub id: String,
    pub title: String,
    /// Where it came from: `"web"`, `"semantic_scholar"`, `"user"`.
    pub source: String,
    pub content: String,
    pub content_hash: String,
    pub created_at: String,
    /// Free-form extras — authors, year, url, external ids.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Stored paper metadata (no content — read that via [`PaperStore::get_paper`]).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PaperMeta {
    pub paper_id: String,
    pub title: String,
    pub source: String,
    pub content_hash: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Chunk {
    pub id: String,
    pub paper_id: String,
    pub text: String,
    pub position: usize,
}

/// One retrieval result: the chunk, a relevance score, and its paper.
///
/// Scores are comparable only within one search mode: BM25 ranks and cosine
/// similarities live on different scales.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub paper: PaperMeta,
}

impl PaperStore {
    pub fn open(work_dir: &Path) -> Result<Self, AppError> {
        let dir = work_dir.join(MEMORY_DIR);
        let papers_dir = dir.join(PAPERS_DIR);
        fs::create_dir_all(&papers_dir).map_err(|e| {
            AppError::Memory(format!("store: cannot create {}: {e}", papers_dir.display()))
        })?;

        let db_path = dir.join(DB_FILENAME);
        let store = Self { dir, papers_dir, db_path };
        store.init_db()?;
        Ok(store)
    }

    /// Add a paper, deduplicating by content hash. Returns the stored id —
    /// the existing one when the same content was added before.
    pub fn add_paper(&self, mut paper: Paper) -> Result<String, AppError> {
        if paper.id.is_empty() {
            paper.id = uuid::Uuid::now_v7().to_string();
        }
        if paper.content_hash.is_empty() {
            paper.content_hash = sha256_hex(&paper.content);
        }
        if paper.created_at.is_empty() {
            paper.created_at = now_iso8601();
        }

        let metadata_json = serde_json::to_string(&paper.metadata)
            .map_err(|e| AppError::Memory(format!("store: serialize metadata: {e}")))?;

        let mut conn = self.open_conn()?;
        if let Some(existing_id) = Self::find_paper_id_by_hash(&conn, &paper.content_hash)? {
            return Ok(existing_id);
        }

        let tx = conn
            .transaction()
            .map_err(|e| AppError::Memory(format!("store: begin tx: {e}")))?;

        tx.execute(
            "INSERT INTO papers (paper_id, title, source, content_hash, created_at, updated_at, metadata) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                paper.id,
                paper.title,
                paper.source,
                paper.content_hash,
                paper.created_at,
                now_iso8601(),
                metadata_json,
            ],
        )
        .map_err(|e| AppError::Memory(format!("store: insert paper: {e}")))?;

        tx.commit()
            .map_err(|e| AppError::Memory(format!("store: commit add_paper: {e}")))?;

        fs::write(self.paper_content_path(&paper.id), paper.content).map_err(|e| {
            AppError::Memory(format!("store: write content for {}: {e}", paper.id))
        })?;

        Ok(paper.id)
    }

    pub fn get_paper(&self, paper_id: &str) -> Result<Paper, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT title, source, content_hash, created_at, metadata FROM papers WHERE paper_id = ?1",
            )
            .map_err(|e| AppError::Memory(format!("store: prepare get_paper: {e}")))?;

        let row = stmt
            .query_row(params![paper_id], |row| {
                let metadata_json: String = row.get(4)?;
                let metadata: HashMap<String, String> =
                    serde_json::from_str(&metadata_json).unwrap_or_default();
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    metadata,
                ))
            })
            .map_err(|e| AppError::Memory(format!("store: get_paper {paper_id}: {e}")))?;

        let content = fs::read_to_string(self.paper_content_path(paper_id)).map_err(|e| {
            AppError::Memory(format!("store: read content for {paper_id}: {e}"))
        })?;

        Ok(Paper {
            id: paper_id.to_string(),
            title: row.0,
            source: row.1,
            content,
            content_hash: row.2,
            created_at: row.3,
            metadata: row.4,
        })
    }

    pub fn list_papers(&self) -> Result<Vec<PaperMeta>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT paper_id, title, source, content_hash, created_at, updated_at, metadata FROM papers ORDER BY created_at DESC",
            )
            .map_err(|e| AppError::Memory(format!("store: prepare list_papers: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                let metadata_json: String = row.get(6)?;
                let metadata = serde_json::from_str::<HashMap<String, String>>(&metadata_json)
                    .unwrap_or_default();
                Ok(PaperMeta {
                    paper_id: row.get(0)?,
                    title: row.get(1)?,
                    source: row.get(2)?,
                    content_hash: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                    metadata,
                })
            })
            .map_err(|e| AppError::Memory(format!("store: query list_papers: {e}")))?;

        let mut papers = Vec::new();
        for row in rows {
            papers.push(
                row.map_err(|e| AppError::Memory(format!("store: map list_papers row: {e}")))?,
            );
        }
        Ok(papers)
    }

    /// Delete a paper with its chunks, embeddings, and content file.
    /// Returns `false` if no such paper was stored.
    pub fn delete_paper(&self, paper_id: &str) -> Result<bool, AppError> {
        let mut conn = self.open_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Memory(format!("store: begin delete tx: {e}")))?;

        tx.execute("DELETE FROM embeddings WHERE paper_id = ?1", params![paper_id])
            .map_err(|e| AppError::Memory(format!("store: delete embeddings for {paper_id}: {e}")))?;

        tx.execute("DELETE FROM chunks WHERE paper_id = ?1", params![paper_id])
            .map_err(|e| AppError::Memory(format!("store: delete chunks for {paper_id}: {e}")))?;

        let deleted = tx
            .execute("DELETE FROM papers WHERE paper_id = ?1", params![paper_id])
            .map_err(|e| AppError::Memory(format!("store: delete paper {paper_id}: {e}")))?;

        tx.commit()
            .map_err(|e| AppError::Memory(format!("store: commit delete tx: {e}")))?;

        let content_path = self.paper_content_path(paper_id);
        if content_path.exists() {
            fs::remove_file(&content_path).map_err(|e| {
                AppError::Memory(format!("store: remove {}: {e}", content_path.display()))
            })?;
        }
        Ok(deleted > 0)
    }

    /// Replace the indexed chunks for the papers these chunks belong to.
    /// Re-indexing a paper drops its stale chunks (and their embeddings) first.
    pub fn index_chunks(&self, chunks: &[Chunk]) -> Result<(), AppError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut conn = self.open_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Memory(format!("store: begin index tx: {e}")))?;

        let mut paper_ids = HashSet::new();
        for chunk in chunks {
            paper_ids.insert(chunk.paper_id.clone());
        }

        for paper_id in &paper_ids {
            tx.execute("DELETE FROM chunks WHERE paper_id = ?1", params![paper_id])
                .map_err(|e| {
                    AppError::Memory(format!("store: clear chunks for {paper_id} before reindex: {e}"))
                })?;
            tx.execute("DELETE FROM embeddings WHERE paper_id = ?1", params![paper_id])
                .map_err(|e| {
                    AppError::Memory(format!("store: clear embeddings for {paper_id}: {e}"))
                })?;
        }

        for chunk in chunks {
            tx.execute(
                "INSERT INTO chunks (id, paper_id, text, position) VALUES (?1, ?2, ?3, ?4)",
                params![chunk.id, chunk.paper_id, chunk.text, chunk.position as i64],
            )
            .map_err(|e| AppError::Memory(format!("store: insert chunk: {e}")))?;
        }

        tx.commit()
            .map_err(|e| AppError::Memory(format!("store: commit index tx: {e}")))?;
        Ok(())
    }

    /// Store embeddings for already-indexed chunks. Vectors are serialized as
    /// little-endian f32 blobs; all vectors in one store must share one
    /// dimension (that of the configured embedding model).
    pub fn attach_embeddings(
        &self,
        items: &[(Chunk, Vec<f32>)],
    ) -> Result<(), AppError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut conn = self.open_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Memory(format!("store: begin embeddings tx: {e}")))?;

        for (chunk, vector) in items {
            tx.execute(
                "INSERT OR REPLACE INTO embeddings (chunk_id, paper_id, dim, vector) VALUES (?1, ?2, ?3, ?4)",
                params![chunk.id, chunk.paper_id, vector.len() as i64, encode_vector(vector)],
            )
            .map_err(|e| AppError::Memory(format!("store: insert embedding: {e}")))?;
        }

        tx.commit()
            .map_err(|e| AppError::Memory(format!("store: commit embeddings tx: {e}")))?;
        Ok(())
    }

    /// BM25 text search over indexed chunks.
    pub fn search_text(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, AppError> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let escaped = escape_fts5_query(query);
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT
                    chunks.id,
                    chunks.paper_id,
                    chunks.text,
                    chunks.position,
                    bm25(chunks) AS rank,
                    papers.title,
                    papers.source,
                    papers.content_hash,
                    papers.created_at,
                    papers.updated_at,
                    papers.metadata
                 FROM chunks
                 JOIN papers ON papers.paper_id = chunks.paper_id
                 WHERE chunks MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )
            .map_err(|e| AppError::Memory(format!("store: prepare search_text: {e}")))?;

        let rows = stmt
            .query_map(params![escaped, top_k as i64], |row| {
                let metadata_json: String = row.get(10)?;
                let metadata = serde_json::from_str::<HashMap<String, String>>(&metadata_json)
                    .unwrap_or_default();

                // bm25() returns lower-is-better; negate so higher is better.
                let score = {
                    let bm25_score: f64 = row.get(4)?;
                    (-bm25_score) as f32
                };

                Ok(ScoredChunk {
                    chunk: Chunk {
                        id: row.get(0)?,
                        paper_id: row.get(1)?,
                        text: row.get(2)?,
                        position: row.get::<_, i64>(3)? as usize,
                    },
                    score,
                    paper: PaperMeta {
                        paper_id: row.get(1)?,
                        title: row.get(5)?,
                        source: row.get(6)?,
                        content_hash: row.get(7)?,
                        created_at: row.get(8)?,
                        updated_at: row.get(9)?,
                        metadata,
                    },
                })
            })
            .map_err(|e| AppError::Memory(format!("store: execute search_text: {e}")))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| AppError::Memory(format!("store: map search row: {e}")))?);
        }
        Ok(results)
    }

    /// Cosine top-k over all stored embeddings, brute force.
    ///
    /// The working set is one research session's ingested chunks — a few
    /// hundred vectors — so a scan beats maintaining an ANN index.
    pub fn search_vector(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>, AppError> {
        if query.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT
                    embeddings.chunk_id,
                    embeddings.paper_id,
                    embeddings.dim,
                    embeddings.vector,
                    chunks.text,
                    chunks.position,
                    papers.title,
                    papers.source,
                    papers.content_hash,
                    papers.created_at,
                    papers.updated_at,
                    papers.metadata
                 FROM embeddings
                 JOIN chunks ON chunks.id = embeddings.chunk_id
                 JOIN papers ON papers.paper_id = embeddings.paper_id",
            )
            .map_err(|e| AppError::Memory(format!("store: prepare search_vector: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                let dim: i64 = row.get(2)?;
                let blob: Vec<u8> = row.get(3)?;
                let metadata_json: String = row.get(11)?;
                let metadata = serde_json::from_str::<HashMap<String, String>>(&metadata_json)
                    .unwrap_or_default();
                Ok((
                    ScoredChunk {
                        chunk: Chunk {
                            id: row.get(0)?,
                            paper_id: row.get(1)?,
                            text: row.get(4)?,
                            position: row.get::<_, i64>(5)? as usize,
                        },
                        score: 0.0,
                        paper: PaperMeta {
                            paper_id: row.get(1)?,
                            title: row.get(6)?,
                            source: row.get(7)?,
                            content_hash: row.get(8)?,
                            created_at: row.get(9)?,
                            updated_at: row.get(10)?,
                            metadata,
                        },
                    },
                    dim as usize,
                    blob,
                ))
            })
            .map_err(|e| AppError::Memory(format!("store: execute search_vector: {e}")))?;

        let mut scored = Vec::new();
        for row in rows {
            let (mut result, dim, blob) =
                row.map_err(|e| AppError::Memory(format!("store: map vector row: {e}")))?;
            let vector = decode_vector(&blob, dim)?;
            if vector.len() != query.len() {
                // Dimension drift (model changed between sessions) — skip.
                continue;
            }
            result.score = cosine_similarity(query, &vector);
            scored.push(result);
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    fn init_db(&self) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        let version: i64 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .map_err(|e| AppError::Memory(format!("store: read schema version: {e}")))?;

        if version == 0 {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS papers (
                    paper_id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    source TEXT NOT NULL,
                    content_hash TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    metadata TEXT NOT NULL
                );

                CREATE VIRTUAL TABLE IF NOT EXISTS chunks USING fts5(
                    id UNINDEXED,
                    paper_id UNINDEXED,
                    text,
                    position UNINDEXED
                );

                CREATE TABLE IF NOT EXISTS embeddings (
                    chunk_id TEXT PRIMARY KEY,
                    paper_id TEXT NOT NULL,
                    dim INTEGER NOT NULL,
                    vector BLOB NOT NULL
                );

                PRAGMA user_version = 1;
                ",
            )
            .map_err(|e| AppError::Memory(format!("store: initialize schema: {e}")))?;
            return Ok(());
        }

        if version != SCHEMA_VERSION {
            return Err(AppError::Memory(format!(
                "store: unsupported schema version {version}, expected {SCHEMA_VERSION}"
            )));
        }

        Ok(())
    }

    fn open_conn(&self) -> Result<Connection, AppError> {
        let conn = Connection::open(&self.db_path)
            .map_err(|e| AppError::Memory(format!("store: open {}: {e}", self.db_path.display())))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| AppError::Memory(format!("store: set journal_mode WAL: {e}")))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| AppError::Memory(format!("store: set foreign_keys ON: {e}")))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| AppError::Memory(format!("store: set busy_timeout: {e}")))?;

        Ok(conn)
    }

    fn paper_content_path(&self, paper_id: &str) -> PathBuf {
        self.papers_dir.join(format!("{paper_id}.txt"))
    }

    fn find_paper_id_by_hash(conn: &Connection, content_hash: &str) -> Result<Option<String>, AppError> {
        let mut stmt = conn
            .prepare("SELECT paper_id FROM papers WHERE content_hash = ?1")
            .map_err(|e| AppError::Memory(format!("store: prepare find by hash: {e}")))?;

        let mut rows = stmt
            .query(params![content_hash])
            .map_err(|e| AppError::Memory(format!("store: query find by hash: {e}")))?;

        if let Some(row) = rows
            .next()
            .map_err(|e| AppError::Memory(format!("store: read find by hash row: {e}")))?
        {
            let paper_id: String = row
                .get(0)
                .map_err(|e| AppError::Memory(format!("store: decode find by hash row: {e}")))?;
            return Ok(Some(paper_id));
        }
        Ok(None)
    }

    pub fn root_dir(&self) -> &Path {
        &self.dir
    }
}

// ── Utilities ─────────────────────────────────────────────────────────────────

/// Return the lowercase hex-encoded SHA-256 digest of `content`.
/// Used as a stable content fingerprint for deduplication.
pub(crate) fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Return the current UTC time as an RFC 3339 string with second precision.
fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Escape a user-supplied string for use in an FTS5 `MATCH` query.
///
/// FTS5 parses the argument to `MATCH` with its own mini-language, so
/// characters like `?`, `"`, `(` are significant. Parameter binding only
/// protects against SQL injection, not FTS syntax errors. Whitespace splits
/// the query; any token containing a non-alphanumeric character is wrapped
/// in double-quotes with internal quotes doubled.
pub(crate) fn escape_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|tok| {
            let is_operator = matches!(tok, "AND" | "OR" | "NOT" | "NEAR");
            if !is_operator && tok.chars().all(|c| c.is_alphanumeric()) {
                tok.to_string()
            } else {
                format!("\"{}\"", tok.replace('"', "\"\""))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn decode_vector(blob: &[u8], dim: usize) -> Result<Vec<f32>, AppError> {
    if blob.len() != dim * 4 {
        return Err(AppError::Memory(format!(
            "store: embedding blob length {} does not match dim {dim}",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Cosine similarity; 0.0 for zero-norm inputs.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
