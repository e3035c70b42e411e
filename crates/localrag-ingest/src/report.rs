use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::info;

use localrag_core::loader::SkippedDocument;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    NoDocuments,
    /// Some embedding batches failed; the rest were indexed.
    CompletedWithErrors,
    Failed(String),
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::NoDocuments => f.write_str("no documents loaded"),
            Self::CompletedWithErrors => f.write_str("completed with errors"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedBatch {
    pub batch: usize,
    pub chunks: usize,
    pub reason: String,
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub source: String,
    pub collection: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: i64,
    pub documents_attempted: usize,
    pub documents_loaded: usize,
    pub skipped: Vec<SkippedDocument>,
    pub chunks_loaded: usize,
    pub chunks_embedded: usize,
    pub chunks_upserted: usize,
    pub failed_batches: Vec<FailedBatch>,
    pub status: JobStatus,
    /// Operator-facing lines, in the order they were emitted.
    pub output: Vec<String>,
}

impl IngestionReport {
    pub fn started(source: impl Into<String>, collection: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            source: source.into(),
            collection: collection.into(),
            started_at: now,
            finished_at: now,
            elapsed_ms: 0,
            documents_attempted: 0,
            documents_loaded: 0,
            skipped: Vec::new(),
            chunks_loaded: 0,
            chunks_embedded: 0,
            chunks_upserted: 0,
            failed_batches: Vec::new(),
            status: JobStatus::Succeeded,
            output: Vec::new(),
        }
    }

    /// Log a line and keep it for the caller.
    pub fn say(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!(target: "localrag_ingest", "{line}");
        self.output.push(line);
    }

    pub fn finish(mut self, status: JobStatus) -> Self {
        self.finished_at = Utc::now();
        self.elapsed_ms = (self.finished_at - self.started_at).num_milliseconds();
        self.status = status;
        self
    }

    pub fn is_failed(&self) -> bool { matches!(self.status, JobStatus::Failed(_)) }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.output {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&format!(
            "Documents: {} loaded of {} attempted, {} skipped\n",
            self.documents_loaded,
            self.documents_attempted,
            self.skipped.len()
        ));
        for s in &self.skipped {
            out.push_str(&format!("  skipped {}: {}\n", s.path, s.reason));
        }
        out.push_str(&format!(
            "Chunks: {} loaded, {} embedded, {} upserted into '{}'\n",
            self.chunks_loaded, self.chunks_embedded, self.chunks_upserted, self.collection
        ));
        for b in &self.failed_batches {
            out.push_str(&format!("  batch {} ({} chunks) failed: {}\n", b.batch, b.chunks, b.reason));
        }
        out.push_str(&format!("Status: {} in {} ms", self.status, self.elapsed_ms));
        out
    }
}
