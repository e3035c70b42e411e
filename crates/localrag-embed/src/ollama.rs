//! Ollama `/api/embed` client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use localrag_core::config::EmbeddingSettings;
use localrag_core::error::{Error, Result};
use localrag_core::traits::Embedder;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    id: String,
    dim: usize,
    max_input_tokens: usize,
}

impl OllamaEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("embedding client: {e}")))?;
        let endpoint = settings.url.trim_end_matches('/').to_string();
        info!(endpoint = %endpoint, model = %settings.model, dim = settings.dimension, "Ollama embedder configured");
        Ok(Self {
            client,
            endpoint,
            model: settings.model.clone(),
            id: settings.embedder_id(),
            dim: settings.dimension,
            max_input_tokens: settings.max_input_tokens,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn embedder_id(&self) -> String { self.id.clone() }
    fn dim(&self) -> usize { self.dim }
    fn max_input_tokens(&self) -> usize { self.max_input_tokens }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = texts.len(), "embedding batch");
        let resp = self
            .client
            .post(format!("{}/api/embed", self.endpoint))
            .json(&EmbedRequest { model: &self.model, input: texts })
            .send()
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body).map(|b| b.error).unwrap_or(body);
            return Err(Error::Embedding(format!("{status}: {message}")));
        }
        let parsed: EmbedResponse = resp.json().await.map_err(|e| Error::Embedding(e.to_string()))?;
        Ok(parsed.embeddings)
    }
}
