//! Paper ingestion — turn search hits into stored, chunked, embedded memory.
//!
//! The pipeline per document: store (deduped by content hash) → chunk →
//! index for FTS → embed → attach vectors. Embeddings are optional: without
//! an embeddings client (offline / dummy runs) the store still serves BM25
//! search, so the loop keeps working.

pub mod chunker;
pub mod pdf;

use std::collections::HashMap;

use reqwest::Client;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::llm::embeddings::EmbeddingsClient;
use crate::memory::{Paper, PaperStore};
use crate::search::{PaperHit, WebHit};

/// Outcome of one ingestion batch, for logging and cost accounting.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub ingested: usize,
    pub duplicates: usize,
    /// Tokens billed by the embeddings endpoint — the caller records these
    /// against the session budget.
    pub embedding_tokens: u64,
}

impl IngestReport {
    fn merge(&mut self, other: IngestReport) {
        self.ingested += other.ingested;
        self.duplicates += other.duplicates;
        self.embedding_tokens += other.embedding_tokens;
    }
}

pub struct Ingestor {
    store: PaperStore,
    embeddings: Option<EmbeddingsClient>,
    fetcher: Client,
    chunk_size: usize,
}

impl Ingestor {
    pub fn new(
        store: PaperStore,
        embeddings: Option<EmbeddingsClient>,
        chunk_size: usize,
    ) -> Result<Self, AppError> {
        let fetcher = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Ingest(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { store, embeddings, fetcher, chunk_size })
    }

    /// Ingest web search hits. Each hit is a small document of its snippet —
    /// thin evidence, but enough context for query refinement.
    pub async fn ingest_web_hits(&self, hits: &[WebHit]) -> Result<IngestReport, AppError> {
        let mut report = IngestReport::default();
        for hit in hits {
            let content = format!("{}\n{}\n{}", hit.title, hit.snippet, hit.link);
            let mut metadata = HashMap::new();
            metadata.insert("url".to_string(), hit.link.clone());
            let paper = Paper {
                id: String::new(),
                title: hit.title.clone(),
                source: "web".to_string(),
                content,
                content_hash: String::new(),
                created_at: String::new(),
                metadata,
            };
            report.merge(self.ingest_document(paper).await?);
        }
        info!(
            ingested = report.ingested,
            duplicates = report.duplicates,
            "web hits ingested"
        );
        Ok(report)
    }

    /// Ingest academic hits. Tries open-access full text; falls back to the
    /// abstract when the PDF is missing or unextractable.
    pub async fn ingest_paper_hits(&self, hits: &[PaperHit]) -> Result<IngestReport, AppError> {
        let mut report = IngestReport::default();
        for hit in hits {
            let abstract_text = hit.abstract_text.clone().unwrap_or_default();
            let body = match &hit.open_access_pdf {
                Some(url) => match self.fetch_pdf_text(url).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(paper_id = %hit.paper_id, error = %e, "pdf ingestion failed, using abstract");
                        abstract_text.clone()
                    }
                },
                None => abstract_text.clone(),
            };

            if body.trim().is_empty() {
                debug!(paper_id = %hit.paper_id, "no abstract or full text, skipping");
                continue;
            }

            let content = format!("{}\n\n{}", hit.reference_line(), body);
            let mut metadata = HashMap::new();
            metadata.insert("external_id".to_string(), hit.paper_id.clone());
            if !hit.authors.is_empty() {
                metadata.insert("authors".to_string(), hit.authors.join(", "));
            }
            if let Some(year) = hit.year {
                metadata.insert("year".to_string(), year.to_string());
            }
            if let Some(url) = &hit.url {
                metadata.insert("url".to_string(), url.clone());
            }

            let paper = Paper {
                id: String::new(),
                title: hit.title.clone(),
                source: "semantic_scholar".to_string(),
                content,
                content_hash: String::new(),
                created_at: String::new(),
                metadata,
            };
            report.merge(self.ingest_document(paper).await?);
        }
        info!(
            ingested = report.ingested,
            duplicates = report.duplicates,
            "paper hits ingested"
        );
        Ok(report)
    }

    /// Store one document, then chunk, index, and embed it.
    /// Duplicates (same content hash) are skipped after the store lookup.
    pub async fn ingest_document(&self, mut paper: Paper) -> Result<IngestReport, AppError> {
        // Pre-assign the id so a hash hit is detectable from the returned id.
        if paper.id.is_empty() {
            paper.id = uuid::Uuid::now_v7().to_string();
        }
        let new_id = paper.id.clone();
        let content = paper.content.clone();

        let stored_id = self.store.add_paper(paper)?;
        if stored_id != new_id {
            debug!(paper_id = %stored_id, "duplicate content, already ingested");
            return Ok(IngestReport { duplicates: 1, ..Default::default() });
        }

        let chunks = chunker::chunk_text(&stored_id, &content, self.chunk_size);
        if chunks.is_empty() {
            return Ok(IngestReport { ingested: 1, ..Default::default() });
        }
        self.store.index_chunks(&chunks)?;

        let mut embedding_tokens = 0;
        if let Some(embedder) = &self.embeddings {
            let inputs: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            match embedder.embed(&inputs).await {
                Ok(batch) => {
                    embedding_tokens = batch.tokens;
                    let items: Vec<_> = chunks.into_iter().zip(batch.vectors).collect();
                    self.store.attach_embeddings(&items)?;
                }
                Err(e) => {
                    // FTS still works; vector recall is just degraded.
                    warn!(paper_id = %stored_id, error = %e, "embedding failed, chunks indexed without vectors");
                }
            }
        }

        Ok(IngestReport { ingested: 1, duplicates: 0, embedding_tokens })
    }

    async fn fetch_pdf_text(&self, url: &str) -> Result<String, AppError> {
        debug!(%url, "fetching open-access pdf");
        let response = self
            .fetcher
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Ingest(format!("pdf fetch failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Ingest(format!("pdf fetch returned HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Ingest(format!("pdf body read failed: {e}")))?;

        pdf::extract_text(&bytes)
    }

    pub fn store(&self) -> &PaperStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_ingestor() -> (TempDir, Ingestor) {
        let temp = TempDir::new().expect("tempdir");
        let store = PaperStore::open(temp.path()).expect("open store");
        let ingestor = Ingestor::new(store, None, 100).expect("ingestor");
        (temp, ingestor)
    }

    #[tokio::test]
    async fn web_hits_are_stored_and_indexed() {
        let (_temp, ingestor) = make_ingestor();
        let hits = vec![WebHit {
            title: "Star formation regions".into(),
            link: "https://example.org/sfr".into(),
            snippet: "Molecular clouds collapse under gravity to form stars".into(),
        }];

        let report = ingestor.ingest_web_hits(&hits).await.unwrap();
        assert_eq!(report.ingested, 1);
        assert_eq!(report.embedding_tokens, 0);

        let results = ingestor.store().search_text("molecular clouds", 5).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].paper.source, "web");
    }

    #[tokio::test]
    async fn duplicate_web_hit_is_skipped() {
        let (_temp, ingestor) = make_ingestor();
        let hit = WebHit {
            title: "Same".into(),
            link: "https://example.org/x".into(),
            snippet: "identical snippet".into(),
        };

        let first = ingestor.ingest_web_hits(std::slice::from_ref(&hit)).await.unwrap();
        let second = ingestor.ingest_web_hits(std::slice::from_ref(&hit)).await.unwrap();
        assert_eq!(first.ingested, 1);
        assert_eq!(second.ingested, 0);
        assert_eq!(second.duplicates, 1);
    }

    #[tokio::test]
    async fn paper_hit_without_pdf_uses_abstract() {
        let (_temp, ingestor) = make_ingestor();
        let hits = vec![PaperHit {
            paper_id: "s2-1".into(),
            title: "Low mass star formation".into(),
            abstract_text: Some("We observe protostellar cores in nearby clouds.".into()),
            authors: vec!["A. Researcher".into()],
            year: Some(2018),
            url: Some("https://www.semanticscholar.org/paper/s2-1".into()),
            open_access_pdf: None,
        }];

        let report = ingestor.ingest_paper_hits(&hits).await.unwrap();
        assert_eq!(report.ingested, 1);

        let papers = ingestor.store().list_papers().unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].metadata.get("external_id").unwrap(), "s2-1");
        assert_eq!(papers[0].metadata.get("year").unwrap(), "2018");
    }

    #[tokio::test]
    async fn paper_hit_without_any_text_is_skipped() {
        let (_temp, ingestor) = make_ingestor();
        let hits = vec![PaperHit {
            paper_id: "s2-2".into(),
            title: "Metadata only".into(),
            abstract_text: None,
            authors: vec![],
            year: None,
            url: None,
            open_access_pdf: None,
        }];

        let report = ingestor.ingest_paper_hits(&hits).await.unwrap();
        assert_eq!(report.ingested, 0);
        assert!(ingestor.store().list_papers().unwrap().is_empty());
    }
}
