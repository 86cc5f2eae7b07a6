//! # KB Indexer
//!
//! Offline ingestion for the retrieval pipeline:
//!
//! ```text
//! source directory
//!     │  DocumentLoader (frontmatter split, per-file skip-and-log)
//!     ▼
//! Document[] ── Chunker ──> Chunk[]
//!                             │
//!                ┌────────────┴────────────┐   (parallel)
//!                ▼                         ▼
//!          VectorStore               LexicalIndex
//! ```
//!
//! Ingestion is batch and idempotent: chunk ids are deterministic, each
//! document's stale chunks are invalidated before upsert, and per-file
//! failures end up in the [`IndexingReport`] instead of aborting the run.

mod error;
mod frontmatter;
mod indexer;
mod loader;
mod report;

pub use error::{IndexerError, Result};
pub use indexer::KnowledgeBaseIndexer;
pub use loader::{document_id_for, normalize_body, DocumentLoader, LoadFailure};
pub use report::{IndexingError, IndexingReport};
