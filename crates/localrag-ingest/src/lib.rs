//! Batch ingestion: load a source, embed the chunks in batches and upsert
//! them into the configured collection.
//!
//! A job never panics its caller and always yields an [`IngestionReport`].
//! Loader skips and failed embedding batches are recorded; configuration
//! errors and index failures stop the job.

use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use localrag_core::config::{EmbeddingFailurePolicy, Settings};
use localrag_core::error::{Error, Result};
use localrag_core::loader::{DocumentLoader, LoadStatus};
use localrag_core::traits::{Embedder, VectorIndex};
use localrag_core::types::{Chunk, IndexEntry};
use localrag_embed::embed_with_retry;

pub mod report;

pub use report::{FailedBatch, IngestionReport, JobStatus};

pub struct IngestionJob {
    settings: Arc<Settings>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    loader: Option<DocumentLoader>,
    source: Option<PathBuf>,
    progress: bool,
}

impl IngestionJob {
    pub fn new(settings: Arc<Settings>, embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { settings, embedder, index, loader: None, source: None, progress: false }
    }

    pub fn with_loader(mut self, loader: DocumentLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Overrides `ingest.source`.
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_progress(mut self, on: bool) -> Self {
        self.progress = on;
        self
    }

    fn source(&self) -> Option<PathBuf> { self.source.clone().or_else(|| self.settings.ingest.source.clone()) }

    fn collection(&self) -> String { self.settings.index.collection.clone() }

    /// Run on a separate task. A panic inside the job comes back as a
    /// failed report.
    pub fn spawn(self) -> JoinHandle<IngestionReport> {
        let source = self.source().map(|p| p.display().to_string()).unwrap_or_default();
        let collection = self.collection();
        let inner = tokio::spawn(self.run());
        tokio::spawn(async move {
            match inner.await {
                Ok(report) => report,
                Err(e) => {
                    error!(error = %e, "ingestion task aborted");
                    let mut report = IngestionReport::started(source, collection);
                    report.say(format!("Ingestion failed: task aborted: {e}"));
                    report.finish(JobStatus::Failed(format!("task aborted: {e}")))
                }
            }
        })
    }

    pub async fn run(self) -> IngestionReport {
        let source = self.source();
        let mut report = IngestionReport::started(
            source.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
            self.collection(),
        );
        let Some(source) = source else {
            return fail(report, "no source configured (set ingest.source or pass a path)".to_string());
        };
        let loader = match self.loader.clone() {
            Some(loader) => loader,
            None => match DocumentLoader::new(&self.settings) {
                Ok(loader) => loader,
                Err(e) => return fail(report, e.to_string()),
            },
        };

        report.say(format!("Loading documents from {}", source.display()));
        let outcome = match loader.load_path(&source).await {
            Ok(outcome) => outcome,
            Err(e) => return fail(report, e.to_string()),
        };
        report.documents_attempted = outcome.attempted;
        report.documents_loaded = outcome.loaded;
        report.chunks_loaded = outcome.chunks.len();
        report.skipped = outcome.skipped.clone();
        match outcome.status() {
            LoadStatus::NoDocuments(reason) => {
                report.say(reason);
                return report.finish(JobStatus::NoDocuments);
            }
            LoadStatus::Loaded { documents, chunks } => {
                report.say(format!("Loaded {documents} documents into {chunks} chunks"));
            }
        }

        match self.embed_and_store(&outcome.chunks, &mut report).await {
            Err(e) => fail(report, e.to_string()),
            Ok(()) if report.failed_batches.is_empty() => {
                report.say(format!("Indexed {} chunks into '{}'", report.chunks_upserted, report.collection));
                report.finish(JobStatus::Succeeded)
            }
            // nothing reached the index: a provider outage, not a partial run
            Ok(()) if report.chunks_upserted == 0 => {
                let first = report.failed_batches.first().map(|b| b.reason.clone()).unwrap_or_default();
                let reason = format!("all {} embedding batches failed: {first}", report.failed_batches.len());
                fail(report, reason)
            }
            Ok(()) => {
                report.say(format!(
                    "Indexed {} chunks into '{}'; {} batches failed",
                    report.chunks_upserted,
                    report.collection,
                    report.failed_batches.len()
                ));
                report.finish(JobStatus::CompletedWithErrors)
            }
        }
    }

    async fn embed_and_store(&self, chunks: &[Chunk], report: &mut IngestionReport) -> Result<()> {
        let batch_size = self.settings.embedding.batch_size.max(1);
        let max_retries = self.settings.embedding.max_retries;
        let embedder_id = self.embedder.embedder_id();
        let collection = self.collection();

        let pb = if self.progress { ProgressBar::new(chunks.len() as u64) } else { ProgressBar::hidden() };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        for (n, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = match embed_with_retry(self.embedder.as_ref(), &texts, max_retries).await {
                Ok(vectors) => vectors,
                Err(e) if e.is_configuration() => {
                    pb.abandon_with_message("aborted");
                    return Err(e);
                }
                Err(e) => {
                    warn!(batch = n, chunks = batch.len(), error = %e, "embedding batch failed");
                    report.failed_batches.push(FailedBatch { batch: n, chunks: batch.len(), reason: e.to_string() });
                    pb.inc(batch.len() as u64);
                    if self.settings.ingest.on_embedding_error == EmbeddingFailurePolicy::Abort {
                        pb.abandon_with_message("aborted");
                        return Err(Error::Embedding(format!("batch {n} failed: {e}")));
                    }
                    continue;
                }
            };
            report.chunks_embedded += vectors.len();

            let entries: Vec<IndexEntry> =
                batch.iter().cloned().zip(vectors).map(|(chunk, vector)| IndexEntry::new(chunk, vector)).collect();
            let written = self.index.upsert(&collection, &embedder_id, &entries).await.map_err(|e| {
                pb.abandon_with_message("aborted");
                e
            })?;
            report.chunks_upserted += written;
            pb.inc(batch.len() as u64);
        }
        pb.finish_with_message("done");
        Ok(())
    }
}

fn fail(mut report: IngestionReport, reason: String) -> IngestionReport {
    error!(reason = %reason, "ingestion failed");
    report.output.push(format!("Ingestion failed: {reason}"));
    report.finish(JobStatus::Failed(reason))
}
