//! Google Custom Search JSON API client.
//!
//! Needs two credentials, both env-sourced: `GOOGLE_API_KEY` and
//! `GOOGLE_CSE_ID` (the programmable search engine id). Without them the
//! client refuses to construct and the loop runs without web context.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};

use crate::config::GoogleSearchConfig;
use crate::error::AppError;

/// One web search result.
#[derive(Debug, Clone)]
pub struct WebHit {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct WebSearch {
    client: Client,
    api_base_url: String,
    api_key: String,
    cse_id: String,
}

impl WebSearch {
    pub fn new(
        config: &GoogleSearchConfig,
        api_key: Option<String>,
        cse_id: Option<String>,
    ) -> Result<Self, AppError> {
        let api_key = api_key
            .ok_or_else(|| AppError::Search("web search needs GOOGLE_API_KEY".into()))?;
        let cse_id = cse_id
            .ok_or_else(|| AppError::Search("web search needs GOOGLE_CSE_ID".into()))?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::Search(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.clone(),
            api_key,
            cse_id,
        })
    }

    /// Run a web search and return up to `max_results` hits.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebHit>, AppError> {
        if query.trim().is_empty() || max_results == 0 {
            return Ok(Vec::new());
        }

        // The API caps `num` at 10.
        let num = max_results.min(10).to_string();
        debug!(%query, %num, "web search");

        let response = self
            .client
            .get(&self.api_base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cse_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "web search HTTP request failed");
                AppError::Search(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            error!(%status, "web search returned HTTP error");
            return Err(AppError::Search(format!("HTTP {status}: {body}")));
        }

        let parsed = response.json::<SearchResponse>().await.map_err(|e| {
            AppError::Search(format!("failed to parse response body: {e}"))
        })?;

        let hits = parsed
            .items
            .into_iter()
            .take(max_results)
            .map(|i| WebHit {
                title: i.title,
                link: i.link,
                snippet: i.snippet.unwrap_or_default(),
            })
            .collect();

        Ok(hits)
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchResponse {
    /// Absent entirely when the query has no results.
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    title: String,
    link: String,
    #[serde(default)]
    snippet: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> GoogleSearchConfig {
        GoogleSearchConfig {
            enabled: true,
            api_base_url: "http://localhost:0/customsearch/v1".into(),
            timeout_seconds: 1,
        }
    }

    #[test]
    fn missing_keys_refuse_construction() {
        assert!(WebSearch::new(&cfg(), None, Some("cse".into())).is_err());
        assert!(WebSearch::new(&cfg(), Some("key".into()), None).is_err());
        assert!(WebSearch::new(&cfg(), Some("key".into()), Some("cse".into())).is_ok());
    }

    #[tokio::test]
    async fn empty_query_returns_no_hits() {
        let ws = WebSearch::new(&cfg(), Some("k".into()), Some("c".into())).unwrap();
        assert!(ws.search("  ", 5).await.unwrap().is_empty());
        assert!(ws.search("rust", 0).await.unwrap().is_empty());
    }

    #[test]
    fn response_with_items_deserializes() {
        let body = r#"{
            "items": [
                {"title": "Star formation", "link": "https://example.org/a", "snippet": "Low mass stars…"},
                {"title": "No snippet", "link": "https://example.org/b"}
            ]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.items.len(), 2);
        assert!(parsed.items[1].snippet.is_none());
    }

    #[test]
    fn response_without_items_deserializes() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.items.is_empty());
    }
}
