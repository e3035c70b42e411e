use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use localrag_core::error::Result;
use localrag_core::traits::Embedder;

/// Deterministic hashing embedder for tests and offline runs.
///
/// Each lowercased word is hashed into one bucket, so texts that share
/// words land close together under cosine similarity.
pub struct FakeEmbedder {
    id: String,
    dim: usize,
    max_input_tokens: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { id: format!("fake:hash:d{dim}"), dim: dim.max(1), max_input_tokens: 8192 }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_max_input_tokens(mut self, max: usize) -> Self {
        self.max_input_tokens = max;
        self
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if token.is_empty() { continue; }
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += 0.5 + val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn embedder_id(&self) -> String { self.id.clone() }
    fn dim(&self) -> usize { self.dim }
    fn max_input_tokens(&self) -> usize { self.max_input_tokens }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
