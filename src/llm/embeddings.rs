//! Embeddings client (`/v1/embeddings`).
//!
//! Same wire idiom as the chat provider: private serde types, bearer auth,
//! structured error decoding. Batched — one request per chunk batch, not one
//! per chunk.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::EmbeddingsConfig;
use crate::llm::ProviderError;

/// A batch of embeddings plus the token count the backend billed for them.
#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    /// One vector per input string, in input order.
    pub vectors: Vec<Vec<f32>>,
    pub tokens: u64,
}

#[derive(Debug, Clone)]
pub struct EmbeddingsClient {
    client: Client,
    api_base_url: String,
    model: String,
    api_key: Option<String>,
}

impl EmbeddingsClient {
    pub fn new(config: &EmbeddingsConfig, api_key: Option<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base_url: config.api_base_url.clone(),
            model: config.model.clone(),
            api_key,
        })
    }

    /// Embed `inputs` in one request. Each datum carries its input index;
    /// results are sorted by it so the input-order invariant holds even for
    /// compatible servers that reply out of order.
    pub async fn embed(&self, inputs: &[String]) -> Result<EmbeddingBatch, ProviderError> {
        if inputs.is_empty() {
            return Ok(EmbeddingBatch { vectors: Vec::new(), tokens: 0 });
        }

        let payload = EmbeddingRequest {
            model: self.model.clone(),
            input: inputs.to_vec(),
        };

        debug!(model = %payload.model, inputs = inputs.len(), "sending embeddings request");

        let mut req = self.client.post(&self.api_base_url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "embeddings HTTP request failed");
            ProviderError::Request(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            error!(%status, "embeddings request returned HTTP error");
            return Err(ProviderError::Request(format!("HTTP {status}: {body}")));
        }

        let mut parsed = response.json::<EmbeddingResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize embeddings response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        if parsed.data.len() != inputs.len() {
            return Err(ProviderError::Request(format!(
                "embeddings count mismatch: sent {}, received {}",
                inputs.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index);
        let vectors = parsed.data.into_iter().map(|d| d.embedding).collect();
        let tokens = parsed.usage.map(|u| u.prompt_tokens).unwrap_or(0);

        Ok(EmbeddingBatch { vectors, tokens })
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
    #[serde(default)]
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    prompt_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_deserializes_and_sorts_by_index() {
        let body = r#"{
            "data": [
                {"index": 1, "embedding": [0.5, 0.5]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ],
            "usage": {"prompt_tokens": 12}
        }"#;
        let mut parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        parsed.data.sort_by_key(|d| d.index);
        assert_eq!(parsed.data[0].embedding, vec![1.0, 0.0]);
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 12);
    }

    #[tokio::test]
    async fn empty_input_short_circuits() {
        let cfg = EmbeddingsConfig {
            api_base_url: "http://localhost:0/v1/embeddings".into(),
            model: "test-embed".into(),
            timeout_seconds: 1,
            input_per_million_usd: 0.0,
        };
        let client = EmbeddingsClient::new(&cfg, None).unwrap();
        let batch = client.embed(&[]).await.unwrap();
        assert!(batch.vectors.is_empty());
        assert_eq!(batch.tokens, 0);
    }
}
