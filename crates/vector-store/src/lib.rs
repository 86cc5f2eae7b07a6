//! # KB Vector Store
//!
//! Dense index for the retrieval pipeline: one embedding per chunk,
//! persisted as JSON keyed by chunk id.
//!
//! ```text
//! Chunk[]
//!     │
//!     ├──> EmbeddingModel (ONNX Runtime CPU, or deterministic stub)
//!     │      └─> Vec<f32> (L2-normalized)
//!     │
//!     └──> VectorStore
//!            ├─> exact cosine query, deterministic ordering
//!            └─> atomic JSON persistence
//! ```
//!
//! Re-upserting a chunk with the same id overwrites its embedding, which is
//! what lets reindexing run without duplicating entries.

mod embeddings;
mod error;
mod store;
mod types;

pub use embeddings::{EmbeddingMode, EmbeddingModel, ModelSpec};
pub use error::{Result, VectorStoreError};
pub use store::{index_path, VectorStore, VECTOR_INDEX_FILE};
pub use types::{StoredChunk, VectorHit};
