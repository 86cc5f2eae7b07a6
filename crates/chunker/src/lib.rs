//! # KB Chunker
//!
//! Core data model and document chunking for the knowledge-base retrieval
//! pipeline.
//!
//! A [`Document`] is split into overlapping [`Chunk`]s by a character
//! sliding window ([`Chunker`]), each carrying its parent's frontmatter
//! plus position info. Chunk ids are deterministic functions of the
//! document id and chunk index, so reindexing an unchanged document
//! reproduces identical ids.

mod chunker;
mod config;
mod error;
mod types;

pub use chunker::Chunker;
pub use config::ChunkerConfig;
pub use error::{ChunkerError, Result};
pub use types::{Chunk, ChunkMetadata, Document, Frontmatter, FrontmatterValue};
