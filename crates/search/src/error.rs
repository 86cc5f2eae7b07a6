use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    /// Invalid retrieval options, surfaced before any index is touched.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Empty query")]
    EmptyQuery,

    /// An underlying store is unreachable. Retryable, and distinct from
    /// "zero results" so callers can degrade or retry.
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// The caller's deadline elapsed. Retryable; indexes are read-only
    /// during a query, so no state was modified.
    #[error("Retrieval timed out after {0:?}")]
    Timeout(Duration),
}

impl From<kb_vector_store::VectorStoreError> for SearchError {
    fn from(err: kb_vector_store::VectorStoreError) -> Self {
        Self::IndexUnavailable(format!("vector store: {err}"))
    }
}

impl From<kb_lexical_index::LexicalIndexError> for SearchError {
    fn from(err: kb_lexical_index::LexicalIndexError) -> Self {
        Self::IndexUnavailable(format!("lexical index: {err}"))
    }
}
