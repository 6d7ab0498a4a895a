//! Integration tests for the paper store.
//!
//! Run with:
//!   cargo test --test test_store

use std::collections::HashMap;

use tempfile::TempDir;

use litrev::ingest::chunker::chunk_text;
use litrev::memory::{Chunk, Paper, PaperStore};

// ── helpers ──────────────────────────────────────────────────────────────────

fn work_dir() -> (TempDir, std::path::PathBuf) {
    let tmp = TempDir::new().expect("tempdir");
    let p = tmp.path().to_path_buf();
    (tmp, p)
}

fn paper(title: &str, content: &str) -> Paper {
    Paper {
        id: String::new(),
        title: title.into(),
        source: "integration-test".into(),
        content: content.into(),
        content_hash: String::new(),
        created_at: String::new(),
        metadata: HashMap::new(),
    }
}

fn indexed_paper(store: &PaperStore, title: &str, content: &str) -> (String, Vec<Chunk>) {
    let id = store.add_paper(paper(title, content)).expect("add paper");
    let chunks = chunk_text(&id, content, 200);
    store.index_chunks(&chunks).expect("index chunks");
    (id, chunks)
}

// ── PaperStore ───────────────────────────────────────────────────────────────

#[test]
fn open_creates_dirs_and_db() {
    let (_tmp, dir) = work_dir();
    let _store = PaperStore::open(&dir).expect("open should succeed");
    assert!(dir.join("memory").join("chunks.db").exists());
    assert!(dir.join("memory").join("papers").is_dir());
}

#[test]
fn add_and_get_roundtrip() {
    let (_tmp, dir) = work_dir();
    let store = PaperStore::open(&dir).unwrap();
    let content = "Low mass stars form from the gravitational collapse of dense cores.";
    let id = store.add_paper(paper("Star Formation", content)).unwrap();

    let fetched = store.get_paper(&id).unwrap();
    assert_eq!(fetched.title, "Star Formation");
    assert_eq!(fetched.content, content);
    assert_eq!(fetched.source, "integration-test");
    assert!(!fetched.content_hash.is_empty());
    assert!(!fetched.created_at.is_empty());
}

#[test]
fn dedup_returns_same_id() {
    let (_tmp, dir) = work_dir();
    let store = PaperStore::open(&dir).unwrap();
    let content = "duplicate content";
    let id1 = store.add_paper(paper("First", content)).unwrap();
    let id2 = store.add_paper(paper("Second", content)).unwrap();
    assert_eq!(id1, id2);
    assert_eq!(store.list_papers().unwrap().len(), 1);
}

#[test]
fn metadata_survives_roundtrip() {
    let (_tmp, dir) = work_dir();
    let store = PaperStore::open(&dir).unwrap();
    let mut p = paper("With Metadata", "content with metadata");
    p.metadata.insert("year".into(), "2019".into());
    p.metadata.insert("url".into(), "https://example.org/p".into());
    let id = store.add_paper(p).unwrap();

    let fetched = store.get_paper(&id).unwrap();
    assert_eq!(fetched.metadata.get("year").map(String::as_str), Some("2019"));
    assert_eq!(
        fetched.metadata.get("url").map(String::as_str),
        Some("https://example.org/p")
    );
}

#[test]
fn text_search_finds_indexed_chunks() {
    let (_tmp, dir) = work_dir();
    let store = PaperStore::open(&dir).unwrap();
    indexed_paper(
        &store,
        "Protostellar Accretion",
        "Protostellar accretion proceeds through a circumstellar disk. \
         Episodic bursts dominate the luminosity of the youngest sources.",
    );
    indexed_paper(
        &store,
        "Galactic Dynamics",
        "Spiral arm structure is shaped by density waves in the stellar disk.",
    );

    let hits = store.search_text("accretion bursts", 5).unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].paper.title, "Protostellar Accretion");
}

#[test]
fn text_search_survives_quotes_in_query() {
    let (_tmp, dir) = work_dir();
    let store = PaperStore::open(&dir).unwrap();
    indexed_paper(&store, "Quoted", "the so-called \"standard model\" of collapse");

    // FTS5-hostile input must not error, whatever it matches.
    let result = store.search_text("\"standard model\" AND collapse (unclosed", 5);
    assert!(result.is_ok());
}

#[test]
fn vector_search_ranks_by_cosine() {
    let (_tmp, dir) = work_dir();
    let store = PaperStore::open(&dir).unwrap();
    let (id, chunks) = indexed_paper(
        &store,
        "Vectors",
        "First passage about star formation. Second passage about galaxy rotation.",
    );
    assert_eq!(chunks[0].paper_id, id);

    // Hand-made embeddings: chunk 0 along x, remaining chunks along y.
    let items: Vec<(Chunk, Vec<f32>)> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let v = if i == 0 { vec![1.0, 0.0] } else { vec![0.0, 1.0] };
            (c.clone(), v)
        })
        .collect();
    store.attach_embeddings(&items).unwrap();

    let hits = store.search_vector(&[0.9, 0.1], 5).unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].chunk.id, chunks[0].id);
    assert!(hits[0].score > 0.9);
}

#[test]
fn vector_search_skips_mismatched_dimensions() {
    let (_tmp, dir) = work_dir();
    let store = PaperStore::open(&dir).unwrap();
    let (_, chunks) = indexed_paper(&store, "Dims", "one short passage");
    let items: Vec<(Chunk, Vec<f32>)> =
        chunks.iter().map(|c| (c.clone(), vec![1.0, 0.0, 0.0])).collect();
    store.attach_embeddings(&items).unwrap();

    // 2-dim query against 3-dim stored vectors: no hits, no error.
    let hits = store.search_vector(&[1.0, 0.0], 5).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn reindex_replaces_stale_chunks() {
    let (_tmp, dir) = work_dir();
    let store = PaperStore::open(&dir).unwrap();
    let (id, _) = indexed_paper(&store, "Reindex", "original wording about magnetars");

    let new_chunks = chunk_text(&id, "revised wording about pulsars", 200);
    store.index_chunks(&new_chunks).unwrap();

    assert!(store.search_text("magnetars", 5).unwrap().is_empty());
    assert!(!store.search_text("pulsars", 5).unwrap().is_empty());
}

#[test]
fn delete_removes_all_traces() {
    let (_tmp, dir) = work_dir();
    let store = PaperStore::open(&dir).unwrap();
    let (id, chunks) = indexed_paper(&store, "ToDelete", "remove this content entirely");
    let items: Vec<(Chunk, Vec<f32>)> =
        chunks.iter().map(|c| (c.clone(), vec![1.0, 0.0])).collect();
    store.attach_embeddings(&items).unwrap();

    assert!(store.delete_paper(&id).unwrap());

    assert!(store.list_papers().unwrap().is_empty());
    assert!(store.search_text("remove", 5).unwrap().is_empty());
    assert!(store.search_vector(&[1.0, 0.0], 5).unwrap().is_empty());
    let content_file = dir.join("memory").join("papers").join(format!("{id}.txt"));
    assert!(!content_file.exists());
}

#[test]
fn delete_missing_paper_reports_false() {
    let (_tmp, dir) = work_dir();
    let store = PaperStore::open(&dir).unwrap();
    assert!(!store.delete_paper("no-such-id").unwrap());
}

#[test]
fn reopen_preserves_data() {
    let (_tmp, dir) = work_dir();
    let id = {
        let store = PaperStore::open(&dir).unwrap();
        let (id, _) = indexed_paper(&store, "Persistent", "data survives a reopen");
        id
    };

    let store = PaperStore::open(&dir).unwrap();
    assert_eq!(store.get_paper(&id).unwrap().title, "Persistent");
    assert!(!store.search_text("survives", 5).unwrap().is_empty());
}
