//! Local memory — the vectorized paper store.
//!
//! One SQLite database under `<work_dir>/memory/` holds paper metadata, an
//! FTS5 chunk index for BM25 text search, and per-chunk embedding blobs for
//! cosine search. Paper full text lives beside it as plain files, one per
//! paper, so the raw material survives schema migrations.

pub mod store;

pub use store::{Chunk, Paper, PaperMeta, PaperStore, ScoredChunk};
