use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::Path;

use crate::error::Result;
use crate::parser::ParsedDocument;
use crate::types::{IndexEntry, SearchHit};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identity recorded per collection, e.g. `ollama:nomic-embed-text:d768`.
    fn embedder_id(&self) -> String;
    fn dim(&self) -> usize;
    fn max_input_tokens(&self) -> usize;
    /// One vector per input text, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, collection: &str, embedder_id: &str, entries: &[IndexEntry]) -> Result<usize>;
    async fn search(&self, collection: &str, embedder_id: &str, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;
    async fn count(&self, collection: &str) -> Result<usize>;
    async fn drop_collection(&self, collection: &str) -> Result<()>;
}

pub type TokenStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> String;
    async fn generate(&self, prompt: &str) -> Result<TokenStream>;
}

pub trait DocumentParser: Send + Sync {
    fn parse(&self, path: &Path) -> Result<ParsedDocument>;
}
