use thiserror::Error;

pub type Result<T> = std::result::Result<T, LexicalIndexError>;

#[derive(Error, Debug)]
pub enum LexicalIndexError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
