//! Domain types shared by the loader, the index and the answerer.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

pub type ChunkId = String;

/// A piece of a source document that is embedded and indexed on its own.
///
/// - `source_path`: path of the originating file, never empty
/// - `page_number`: 1-based page for paginated formats (PDF), `None` otherwise
/// - `header_path`: markdown headings enclosing the text, outermost first
/// - `chunk_index`: ordinal of the chunk within its source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_path: String,
    pub page_number: Option<u32>,
    pub header_path: Vec<String>,
    pub chunk_index: usize,
}

impl Chunk {
    pub fn new(
        text: impl Into<String>,
        source_path: impl Into<String>,
        page_number: Option<u32>,
        header_path: Vec<String>,
        chunk_index: usize,
    ) -> Result<Self> {
        let source_path = source_path.into();
        if source_path.trim().is_empty() {
            return Err(Error::InvalidConfig("chunk source_path must not be empty".to_string()));
        }
        Ok(Self { text: text.into(), source_path, page_number, header_path, chunk_index })
    }

    /// Stable id: blake3 of the source path and the chunk ordinal.
    pub fn identity(&self) -> ChunkId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.source_path.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(self.chunk_index as u64).to_le_bytes());
        hasher.finalize().to_hex().to_string()
    }

    pub fn content_hash(&self) -> String {
        blake3::hash(self.text.as_bytes()).to_hex().to_string()
    }

    pub fn citation(&self) -> Citation {
        Citation { source_path: self.source_path.clone(), page_number: self.page_number }
    }
}

/// A chunk together with its embedding, ready to be written to a collection.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: ChunkId,
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

impl IndexEntry {
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self { id: chunk.identity(), vector, chunk }
    }
}

/// `score` is cosine similarity; higher is better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub source_path: String,
    pub page_number: Option<u32>,
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page_number {
            Some(page) => write!(f, "{}#page={}", self.source_path, page),
            None => write!(f, "{}", self.source_path),
        }
    }
}
