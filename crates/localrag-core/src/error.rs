use std::fmt::Display;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Collection '{collection}' was built with embedder '{expected}', refusing '{actual}'")]
    ModelMismatch {
        collection: String,
        expected: String,
        actual: String,
    },

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Failed to load {path}: {reason}")]
    Load { path: String, reason: String },

    #[error("Unsupported format for {path}: {extension}")]
    UnsupportedFormat { path: String, extension: String },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Vector index error: {0}")]
    Index(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn load(path: &Path, reason: impl Display) -> Self {
        Self::Load { path: path.display().to_string(), reason: reason.to_string() }
    }

    /// Configuration errors are fatal and must never be retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_)
                | Self::DimensionMismatch { .. }
                | Self::ModelMismatch { .. }
                | Self::CollectionNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
