//! # KB Search
//!
//! Query side of the retrieval pipeline: fusion ranking over the dense and
//! sparse indexes, and context assembly under a hard character budget.
//!
//! ```text
//! query ──┬──> VectorStore.query ────┐   (concurrent)
//!         └──> LexicalIndex.query ───┤
//!                                    ▼
//!                     per-set min-max normalization
//!                                    ▼
//!               fused = vw·norm_vec + lw·norm_lex
//!                                    ▼
//!          deterministic ordering ──> top k ──> ContextAssembler
//! ```
//!
//! Ordering is fully deterministic (fused score, then vector score, then
//! chunk id), so identical queries against identical indexes produce
//! byte-identical rankings.

mod assembler;
mod error;
mod fusion;
mod knowledge_base;
mod options;
mod retriever;

pub use assembler::{AssembledContext, ContextAssembler, IncludedChunk, CONTEXT_DELIMITER};
pub use error::{Result, SearchError};
pub use fusion::{min_max_normalize, FusedCandidate, WeightedFusion};
pub use knowledge_base::KnowledgeBase;
pub use options::RetrievalOptions;
pub use retriever::{FusionRetriever, RetrievalResult};
