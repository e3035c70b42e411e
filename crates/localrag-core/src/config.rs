//! Runtime settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_INDEX__COLLECTION`). The merged
//! value is validated once and is immutable afterwards.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Lance,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub backend: IndexBackend,
    /// LanceDB database URI: a local directory or a remote `db://` style URI.
    pub uri: String,
    pub collection: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { backend: IndexBackend::Lance, uri: "data/lancedb".to_string(), collection: "template".to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    Ollama,
    Fake,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    pub url: String,
    pub model: String,
    pub dimension: usize,
    pub max_input_tokens: usize,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Ollama,
            url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dimension: 768,
            max_input_tokens: 8192,
            batch_size: 32,
            max_retries: 0,
            timeout_secs: 120,
        }
    }
}

impl EmbeddingSettings {
    /// Model identity recorded per collection, e.g. `ollama:nomic-embed-text:d768`.
    pub fn embedder_id(&self) -> String {
        let provider = match self.provider {
            EmbeddingProviderKind::Ollama => "ollama",
            EmbeddingProviderKind::Fake => "fake",
        };
        format!("{}:{}:d{}", provider, self.model, self.dimension)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self { url: "http://localhost:11434".to_string(), model: "deepseek-r1:1.5b".to_string(), timeout_secs: 600 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self { Self { top_k: 4 } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    DocChunks,
    Markdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingFailurePolicy {
    /// Record the failed batch and keep embedding the remaining ones.
    Continue,
    /// Stop the run at the first failed batch.
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub source: Option<PathBuf>,
    pub mode: ExportMode,
    pub chunk_max_tokens: usize,
    /// `tokenizer.json` of the embedding model; without it token counts are approximated.
    pub tokenizer_file: Option<PathBuf>,
    pub load_concurrency: usize,
    pub on_embedding_error: EmbeddingFailurePolicy,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            source: None,
            mode: ExportMode::DocChunks,
            chunk_max_tokens: 512,
            tokenizer_file: None,
            load_concurrency: 4,
            on_embedding_error: EmbeddingFailurePolicy::Continue,
        }
    }
}

/// Immutable runtime settings, built once at startup and passed by reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub index: IndexSettings,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub retrieval: RetrievalSettings,
    pub ingest: IngestSettings,
}

impl Settings {
    /// Merge `config.toml`, `config.<env>.toml` and `APP_*` variables from the
    /// working directory. `RUST_ENV` selects the environment (default `dev`);
    /// `APP_USE_FAKE_EMBEDDINGS=1` forces the hashing embedder.
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let mut settings = Self::from_figment(Self::figment(Path::new("."), &env_name))?;
        let use_fake = env::var("APP_USE_FAKE_EMBEDDINGS")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if use_fake {
            settings.embedding.provider = EmbeddingProviderKind::Fake;
        }
        Ok(settings)
    }

    pub fn figment(base: &Path, env_name: &str) -> Figment {
        let mut figment = Figment::new().merge(Toml::file(base.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(base.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(base.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(base.join("config.test.toml"))),
            _ => {}
        }
        figment.merge(Env::prefixed("APP_").split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let mut settings: Settings = figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.expand_paths();
        settings.validate()?;
        Ok(settings)
    }

    fn expand_paths(&mut self) {
        if !self.index.uri.contains("://") {
            self.index.uri = expand_path(&self.index.uri).to_string_lossy().to_string();
        }
        if let Some(source) = self.ingest.source.take() {
            self.ingest.source = Some(expand_path(source.to_string_lossy()));
        }
        if let Some(file) = self.ingest.tokenizer_file.take() {
            self.ingest.tokenizer_file = Some(expand_path(file.to_string_lossy()));
        }
    }

    pub fn validate(&self) -> Result<()> {
        let collection = &self.index.collection;
        if collection.is_empty()
            || !collection.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(invalid("index.collection", format!("'{collection}' must be non-empty and use [A-Za-z0-9_.-]")));
        }
        if self.index.uri.trim().is_empty() {
            return Err(invalid("index.uri", "must not be empty"));
        }
        validate_http_url("embedding.url", &self.embedding.url)?;
        validate_http_url("llm.url", &self.llm.url)?;
        if self.embedding.model.trim().is_empty() {
            return Err(invalid("embedding.model", "must not be empty"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(invalid("llm.model", "must not be empty"));
        }
        for (key, value) in [
            ("embedding.dimension", self.embedding.dimension),
            ("embedding.max_input_tokens", self.embedding.max_input_tokens),
            ("embedding.batch_size", self.embedding.batch_size),
            ("retrieval.top_k", self.retrieval.top_k),
            ("ingest.chunk_max_tokens", self.ingest.chunk_max_tokens),
            ("ingest.load_concurrency", self.ingest.load_concurrency),
        ] {
            if value == 0 {
                return Err(invalid(key, "must be greater than zero"));
            }
        }
        if let Some(file) = &self.ingest.tokenizer_file {
            if !file.is_file() {
                return Err(invalid("ingest.tokenizer_file", format!("{} does not exist", file.display())));
            }
        }
        Ok(())
    }

    /// Token budget for a single chunk; never above what the embedder accepts.
    pub fn chunk_token_budget(&self) -> usize {
        self.ingest.chunk_max_tokens.min(self.embedding.max_input_tokens)
    }
}

fn invalid(key: &str, reason: impl std::fmt::Display) -> Error {
    Error::InvalidConfig(format!("{key}: {reason}"))
}

fn validate_http_url(key: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value).map_err(|e| invalid(key, format!("'{value}' is not a URL ({e})")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(key, format!("unsupported scheme '{other}'"))),
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
