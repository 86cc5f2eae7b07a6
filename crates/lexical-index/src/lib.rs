//! # KB Lexical Index
//!
//! Sparse signal of the retrieval pipeline: a BM25 (term-frequency /
//! inverse-document-frequency) index over the same chunks the vector store
//! embeds. Favors exact keyword matches the dense signal can miss.
//!
//! Tokenization is case-insensitive, strips punctuation, and removes a
//! fixed stopword set. BM25 scores are unbounded positive; the fusion
//! layer normalizes them before combining with the bounded vector signal.

mod error;
mod index;
mod scorer;
mod tokenizer;

pub use error::{LexicalIndexError, Result};
pub use index::{index_path, LexicalHit, LexicalIndex, LEXICAL_INDEX_FILE};
pub use scorer::{BM25_B, BM25_K1};
pub use tokenizer::tokenize;
