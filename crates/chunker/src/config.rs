use crate::error::{ChunkerError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for document chunking behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Whether chunking is enabled. When disabled, every document becomes
    /// a single chunk spanning its whole body.
    pub enabled: bool,

    /// Sliding window width in characters.
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks. Must stay below
    /// `chunk_size` so the window always advances.
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chunk_size: 2000,
            overlap: 200,
        }
    }
}

impl ChunkerConfig {
    /// Create a pass-through config (one chunk per document).
    #[must_use]
    pub fn pass_through() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Build a config from `KB_*` environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// Reads `KB_ENABLE_CHUNKING`, `KB_CHUNK_SIZE`, and `KB_CHUNK_OVERLAP`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let enabled = match std::env::var("KB_ENABLE_CHUNKING") {
            Ok(raw) => matches!(raw.to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
            Err(_) => defaults.enabled,
        };
        let chunk_size = env_usize("KB_CHUNK_SIZE", defaults.chunk_size)?;
        let overlap = env_usize("KB_CHUNK_OVERLAP", defaults.overlap)?;

        let config = Self {
            enabled,
            chunk_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the chunk/overlap combination.
    ///
    /// `overlap >= chunk_size` means a non-positive window step, which would
    /// loop forever; it is rejected here rather than detected mid-chunking.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ChunkerError::invalid_config("chunk_size must be > 0"));
        }

        if self.overlap >= self.chunk_size {
            return Err(ChunkerError::invalid_config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }

        Ok(())
    }

    /// Window advance per chunk, in characters.
    #[must_use]
    pub const fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

fn env_usize(name: &str, default: usize) -> Result<usize> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| ChunkerError::invalid_config(format!("{name}='{raw}': {e}"))),
        Err(_) => Ok(default),
    }
}
