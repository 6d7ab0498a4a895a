//! Semantic Scholar Graph API client (`/graph/v1/paper/search`).
//!
//! Works unauthenticated at a shared rate limit; an `S2_API_KEY` env var, if
//! present, is sent as `x-api-key` for a dedicated quota. The requested field
//! list is configurable so deployments can trim the payload.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};

use crate::config::PaperSearchConfig;
use crate::error::AppError;

/// One academic search result.
#[derive(Debug, Clone)]
pub struct PaperHit {
    pub paper_id: String,
    pub title: String,
    pub abstract_text: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub url: Option<String>,
    /// Direct PDF link when the paper is open access.
    pub open_access_pdf: Option<String>,
}

impl PaperHit {
    /// Citation-ish one-liner used in findings and console output.
    pub fn reference_line(&self) -> String {
        let authors = if self.authors.is_empty() {
            "unknown authors".to_string()
        } else if self.authors.len() > 3 {
            format!("{} et al.", self.authors[0])
        } else {
            self.authors.join(", ")
        };
        match self.year {
            Some(year) => format!("{} ({year}). {}", authors, self.title),
            None => format!("{}. {}", authors, self.title),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaperSearch {
    client: Client,
    api_base_url: String,
    fields: String,
    api_key: Option<String>,
}

impl PaperSearch {
    pub fn new(config: &PaperSearchConfig, api_key: Option<String>) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::Search(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.clone(),
            fields: config.fields.clone(),
            api_key,
        })
    }

    /// Search papers and return up to `max_results` hits.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<PaperHit>, AppError> {
        if query.trim().is_empty() || max_results == 0 {
            return Ok(Vec::new());
        }

        debug!(%query, max_results, "paper search");

        let limit = max_results.to_string();
        let mut req = self
            .client
            .get(&self.api_base_url)
            .query(&[
                ("query", query),
                ("fields", self.fields.as_str()),
                ("limit", limit.as_str()),
            ]);
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }

        let response = req.send().await.map_err(|e| {
            error!(error = %e, "paper search HTTP request failed");
            AppError::Search(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            error!(%status, "paper search returned HTTP error");
            return Err(AppError::Search(format!("HTTP {status}: {body}")));
        }

        let parsed = response.json::<SearchResponse>().await.map_err(|e| {
            AppError::Search(format!("failed to parse response body: {e}"))
        })?;

        let hits = parsed
            .data
            .into_iter()
            .map(|p| PaperHit {
                paper_id: p.paper_id,
                title: p.title.unwrap_or_else(|| "(untitled)".to_string()),
                abstract_text: p.r#abstract,
                authors: p.authors.into_iter().filter_map(|a| a.name).collect(),
                year: p.year,
                url: p.url,
                open_access_pdf: p.open_access_pdf.and_then(|o| o.url),
            })
            .collect();

        Ok(hits)
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchResponse {
    /// Absent when the query matches nothing.
    #[serde(default)]
    data: Vec<PaperRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaperRecord {
    paper_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    r#abstract: Option<String>,
    #[serde(default)]
    authors: Vec<AuthorRecord>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    open_access_pdf: Option<OpenAccessPdf>,
}

#[derive(Debug, Deserialize)]
struct AuthorRecord {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAccessPdf {
    #[serde(default)]
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PaperSearchConfig {
        PaperSearchConfig {
            enabled: true,
            api_base_url: "http://localhost:0/graph/v1/paper/search".into(),
            fields: "title,abstract,authors,year,url,openAccessPdf".into(),
            timeout_seconds: 1,
        }
    }

    #[tokio::test]
    async fn empty_query_returns_no_hits() {
        let ps = PaperSearch::new(&cfg(), None).unwrap();
        assert!(ps.search("", 5).await.unwrap().is_empty());
    }

    #[test]
    fn response_deserializes() {
        let body = r#"{
            "total": 2,
            "data": [
                {
                    "paperId": "abc123",
                    "title": "High mass star formation",
                    "abstract": "We study…",
                    "authors": [{"name": "A. Researcher"}, {"name": null}],
                    "year": 2019,
                    "url": "https://www.semanticscholar.org/paper/abc123",
                    "openAccessPdf": {"url": "https://arxiv.org/pdf/1901.00001"}
                },
                {"paperId": "def456"}
            ]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data[0].year, Some(2019));
        assert!(parsed.data[1].title.is_none());
        assert!(parsed.data[1].open_access_pdf.is_none());
    }

    #[test]
    fn reference_line_formats() {
        let hit = PaperHit {
            paper_id: "x".into(),
            title: "A Title".into(),
            abstract_text: None,
            authors: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            year: Some(2020),
            url: None,
            open_access_pdf: None,
        };
        assert_eq!(hit.reference_line(), "A et al. (2020). A Title");

        let hit = PaperHit { authors: vec![], year: None, ..hit };
        assert_eq!(hit.reference_line(), "unknown authors. A Title");
    }
}
