use crate::error::{Result, SearchError};
use kb_chunker::ChunkerConfig;
use std::time::Duration;

/// Options for a `retrieve_context` call.
///
/// `vector_weight` / `lexical_weight` are documented as normalized weights
/// but are not forced to sum to 1; the caller controls the sum.
/// The chunking fields configure ingestion and ride along here so one
/// options value describes a knowledge base end to end.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOptions {
    /// Number of chunks to retrieve. Required; there is no default.
    pub k: usize,

    /// Whether ingestion splits documents (pass-through when false).
    pub chunk_enabled: bool,

    /// Ingestion window width in characters.
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,

    /// Hard budget for the assembled context, in characters.
    pub max_context_chars: usize,

    /// Weight of the normalized dense (cosine) signal.
    pub vector_weight: f32,

    /// Weight of the normalized sparse (BM25) signal.
    pub lexical_weight: f32,

    /// Minimum raw cosine similarity a candidate must reach *when a vector
    /// score exists for it*; lexical-only candidates are never filtered.
    pub similarity_threshold: f32,

    /// Caller deadline for the whole retrieval. `None` means no deadline.
    pub timeout: Option<Duration>,
}

impl RetrievalOptions {
    /// Options with the stock 60/40 weighting and default chunking.
    #[must_use]
    pub fn new(k: usize) -> Self {
        let chunking = ChunkerConfig::default();
        Self {
            k,
            chunk_enabled: chunking.enabled,
            chunk_size: chunking.chunk_size,
            chunk_overlap: chunking.overlap,
            max_context_chars: 30_000,
            vector_weight: 0.6,
            lexical_weight: 0.4,
            similarity_threshold: 0.0,
            timeout: None,
        }
    }

    /// Build options from `KB_*` environment variables, with `new(k)` as
    /// the fallback for anything unset.
    pub fn from_env(k: usize) -> Result<Self> {
        let chunking = ChunkerConfig::from_env()
            .map_err(|e| SearchError::InvalidOptions(e.to_string()))?;
        let defaults = Self::new(k);

        let options = Self {
            k,
            chunk_enabled: chunking.enabled,
            chunk_size: chunking.chunk_size,
            chunk_overlap: chunking.overlap,
            max_context_chars: env_parse("KB_CONTEXT_MAX_CHARS", defaults.max_context_chars)?,
            vector_weight: env_parse("KB_VECTOR_WEIGHT", defaults.vector_weight)?,
            lexical_weight: env_parse("KB_LEXICAL_WEIGHT", defaults.lexical_weight)?,
            similarity_threshold: env_parse(
                "KB_SIMILARITY_THRESHOLD",
                defaults.similarity_threshold,
            )?,
            timeout: None,
        };
        options.validate()?;
        Ok(options)
    }

    /// Validate everything before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(SearchError::InvalidOptions("k must be > 0".to_string()));
        }

        if !self.vector_weight.is_finite() || !self.lexical_weight.is_finite() {
            return Err(SearchError::InvalidOptions(
                "weights must be finite".to_string(),
            ));
        }
        if self.vector_weight < 0.0 || self.lexical_weight < 0.0 {
            return Err(SearchError::InvalidOptions(format!(
                "weights must be non-negative (vector {}, lexical {})",
                self.vector_weight, self.lexical_weight
            )));
        }
        if self.vector_weight == 0.0 && self.lexical_weight == 0.0 {
            return Err(SearchError::InvalidOptions(
                "at least one weight must be positive".to_string(),
            ));
        }

        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(SearchError::InvalidOptions(format!(
                "similarity_threshold {} outside [-1, 1]",
                self.similarity_threshold
            )));
        }

        self.chunker_config()
            .validate()
            .map_err(|e| SearchError::InvalidOptions(e.to_string()))?;

        Ok(())
    }

    /// The ingestion-side view of these options.
    #[must_use]
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            enabled: self.chunk_enabled,
            chunk_size: self.chunk_size,
            overlap: self.chunk_overlap,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| SearchError::InvalidOptions(format!("{name}='{raw}': {e}"))),
        Err(_) => Ok(default),
    }
}
