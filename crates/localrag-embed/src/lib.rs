use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use localrag_core::config::{EmbeddingProviderKind, EmbeddingSettings};
use localrag_core::error::{Error, Result};
use localrag_core::traits::Embedder;

mod fake;
mod ollama;

pub use fake::FakeEmbedder;
pub use ollama::OllamaEmbedder;

pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    match settings.provider {
        EmbeddingProviderKind::Fake => {
            info!(dim = settings.dimension, "Using FakeEmbedder");
            Ok(Arc::new(
                FakeEmbedder::new(settings.dimension)
                    .with_id(settings.embedder_id())
                    .with_max_input_tokens(settings.max_input_tokens),
            ))
        }
        EmbeddingProviderKind::Ollama => Ok(Arc::new(OllamaEmbedder::new(settings)?)),
    }
}

/// Count and dimension must match what the embedder declares.
pub fn check_vectors(embedder: &dyn Embedder, inputs: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != inputs {
        return Err(Error::Embedding(format!("expected {inputs} vectors, provider returned {}", vectors.len())));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != embedder.dim()) {
        return Err(Error::DimensionMismatch { expected: embedder.dim(), actual: bad.len() });
    }
    Ok(())
}

/// Embed one batch, retrying provider failures up to `max_retries` times.
/// Configuration errors are returned immediately.
pub async fn embed_with_retry(embedder: &dyn Embedder, texts: &[String], max_retries: u32) -> Result<Vec<Vec<f32>>> {
    let mut attempt = 0u32;
    loop {
        let result = match embedder.embed_batch(texts).await {
            Ok(vectors) => check_vectors(embedder, texts.len(), &vectors).map(|()| vectors),
            Err(e) => Err(e),
        };
        match result {
            Ok(vectors) => return Ok(vectors),
            Err(e) if e.is_configuration() || attempt >= max_retries => return Err(e),
            Err(e) => {
                attempt += 1;
                warn!(attempt, max_retries, error = %e, "embedding batch failed, retrying");
                tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
            }
        }
    }
}

pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let texts = [text.to_string()];
    let vectors = embedder.embed_batch(&texts).await?;
    check_vectors(embedder, 1, &vectors)?;
    vectors.into_iter().next().ok_or_else(|| Error::Embedding("empty response".to_string()))
}
