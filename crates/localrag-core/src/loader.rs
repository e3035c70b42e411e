//! Path to chunks, with provenance.
//!
//! A directory is read non-recursively in file-name order; each file is
//! parsed on a blocking thread and a failing file is recorded as skipped
//! instead of aborting the batch. A single file path propagates its error.

use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chunker::HybridChunker;
use crate::config::{ExportMode, Settings};
use crate::error::{Error, Result};
use crate::markdown::split_sections;
use crate::parser::LocalParser;
use crate::tokens::TokenCounter;
use crate::traits::DocumentParser;
use crate::types::Chunk;

#[derive(Debug, Clone, Serialize)]
pub struct SkippedDocument {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded { documents: usize, chunks: usize },
    NoDocuments(String),
}

#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub source: PathBuf,
    pub chunks: Vec<Chunk>,
    pub attempted: usize,
    pub loaded: usize,
    pub skipped: Vec<SkippedDocument>,
    pub missing: bool,
}

impl LoadOutcome {
    pub fn status(&self) -> LoadStatus {
        if self.missing {
            return LoadStatus::NoDocuments(format!("no documents loaded: {} does not exist", self.source.display()));
        }
        if self.chunks.is_empty() {
            return LoadStatus::NoDocuments(format!(
                "no documents loaded from {} ({} attempted, {} skipped)",
                self.source.display(),
                self.attempted,
                self.skipped.len()
            ));
        }
        LoadStatus::Loaded { documents: self.loaded, chunks: self.chunks.len() }
    }
}

struct LoaderInner {
    parser: Arc<dyn DocumentParser>,
    counter: TokenCounter,
    mode: ExportMode,
    max_tokens: usize,
    concurrency: usize,
}

#[derive(Clone)]
pub struct DocumentLoader {
    inner: Arc<LoaderInner>,
}

impl DocumentLoader {
    pub fn new(settings: &Settings) -> Result<Self> {
        let counter = TokenCounter::from_settings(settings.ingest.tokenizer_file.as_deref())?;
        Ok(Self::from_parts(
            Arc::new(LocalParser),
            counter,
            settings.ingest.mode,
            settings.chunk_token_budget(),
            settings.ingest.load_concurrency,
        ))
    }

    pub fn from_parts(
        parser: Arc<dyn DocumentParser>,
        counter: TokenCounter,
        mode: ExportMode,
        max_tokens: usize,
        concurrency: usize,
    ) -> Self {
        Self { inner: Arc::new(LoaderInner { parser, counter, mode, max_tokens, concurrency: concurrency.max(1) }) }
    }

    /// Parse and chunk one file synchronously.
    pub fn load_file(&self, path: &Path) -> Result<Vec<Chunk>> {
        let doc = self.inner.parser.parse(path)?;
        if doc.format.is_paginated() && doc.pages.iter().any(|p| p.number.is_none()) {
            return Err(Error::load(path, "paginated document with an unnumbered page"));
        }
        if doc.is_blank() {
            debug!(path = %path.display(), "document has no text");
            return Ok(Vec::new());
        }
        match self.inner.mode {
            ExportMode::DocChunks => HybridChunker::new(&self.inner.counter, self.inner.max_tokens).chunk(&doc),
            ExportMode::Markdown => {
                let source_path = doc.path.to_string_lossy().to_string();
                split_sections(&doc.pages)
                    .into_iter()
                    .enumerate()
                    .map(|(i, s)| Chunk::new(s.text, source_path.clone(), s.page_number, s.header_path, i))
                    .collect()
            }
        }
    }

    /// Lazily loads the direct file entries of `dir` in name order, at most
    /// `load_concurrency` files at a time.
    pub fn documents(&self, dir: &Path) -> Result<BoxStream<'static, (PathBuf, Result<Vec<Chunk>>)>> {
        let files = list_files(dir)?;
        let concurrency = self.inner.concurrency;
        let loader = self.clone();
        Ok(stream::iter(files)
            .map(move |path| {
                let loader = loader.clone();
                async move {
                    let task_path = path.clone();
                    let result = tokio::task::spawn_blocking(move || loader.load_file(&task_path))
                        .await
                        .unwrap_or_else(|e| Err(Error::load(&path, e)));
                    (path, result)
                }
            })
            .buffered(concurrency)
            .boxed())
    }

    pub async fn load_path(&self, path: &Path) -> Result<LoadOutcome> {
        let mut outcome = LoadOutcome { source: path.to_path_buf(), ..LoadOutcome::default() };
        if !path.exists() {
            warn!(path = %path.display(), "source path does not exist");
            outcome.missing = true;
            return Ok(outcome);
        }
        if path.is_file() {
            outcome.attempted = 1;
            let loader = self.clone();
            let file = path.to_path_buf();
            let chunks = tokio::task::spawn_blocking(move || loader.load_file(&file))
                .await
                .map_err(|e| Error::load(path, e))??;
            outcome.loaded = 1;
            outcome.chunks = chunks;
            return Ok(outcome);
        }

        let mut docs = self.documents(path)?;
        while let Some((file, result)) = docs.next().await {
            outcome.attempted += 1;
            match result {
                Ok(chunks) => {
                    info!(path = %file.display(), chunks = chunks.len(), "loaded document");
                    outcome.loaded += 1;
                    outcome.chunks.extend(chunks);
                }
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "skipping document");
                    outcome.skipped.push(SkippedDocument { path: file.display().to_string(), reason: e.to_string() });
                }
            }
        }
        Ok(outcome)
    }
}

/// Direct file entries of `dir`, symlinks followed, sorted by name. An
/// unreadable `dir` is an error; an entry that cannot be inspected is still
/// listed so that loading it records the reason.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        match entry {
            Ok(e) if e.file_type().is_file() => files.push(e.path().to_path_buf()),
            Ok(_) => {}
            Err(e) => {
                let entry = e.path().filter(|p| e.depth() > 0 && *p != dir).map(Path::to_path_buf);
                match entry {
                    Some(p) => files.push(p),
                    None => return Err(Error::load(dir, e)),
                }
            }
        }
    }
    files.sort();
    Ok(files)
}
