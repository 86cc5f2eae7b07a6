use kb_chunker::Chunk;
use serde::{Deserialize, Serialize};

/// A chunk persisted in the vector store together with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// One vector-query candidate: a chunk id and its cosine similarity to
/// the query embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: String,
    pub score: f32,
}
