use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of a `reindex` run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexingReport {
    /// Number of documents successfully loaded.
    pub documents_loaded: usize,

    /// Number of chunks produced and indexed.
    pub chunks_created: usize,

    /// Wall time of the run in milliseconds.
    pub time_ms: u64,

    /// Per-file failures. Collected, never fatal to the batch.
    pub errors: Vec<IndexingError>,
}

/// One file the ingestion run could not process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingError {
    pub path: PathBuf,
    pub reason: String,
}

impl IndexingReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, path: impl Into<PathBuf>, reason: impl Into<String>) {
        self.errors.push(IndexingError {
            path: path.into(),
            reason: reason.into(),
        });
    }
}

impl std::fmt::Display for IndexingReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Documents: {} | Chunks: {} | Errors: {} | {}ms",
            self.documents_loaded,
            self.chunks_created,
            self.errors.len(),
            self.time_ms
        )
    }
}
