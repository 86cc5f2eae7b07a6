use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Chunker error: {0}")]
    ChunkerError(#[from] kb_chunker::ChunkerError),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] kb_vector_store::VectorStoreError),

    #[error("Lexical index error: {0}")]
    LexicalIndexError(#[from] kb_lexical_index::LexicalIndexError),

    #[error("Invalid source path: {0}")]
    InvalidPath(String),
}
