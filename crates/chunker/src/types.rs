use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Structured metadata parsed from a document's header block.
///
/// Keys map to either a scalar string or a list of strings. A document
/// without a header (or with a malformed one) carries an empty mapping.
pub type Frontmatter = BTreeMap<String, FrontmatterValue>;

/// A single frontmatter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrontmatterValue {
    /// Scalar value, e.g. `title: Install guide`.
    Text(String),
    /// List value, e.g. `tags: setup, network, vpn`.
    List(Vec<String>),
}

impl FrontmatterValue {
    /// Flatten to a single string; lists render comma-joined.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(value) => value.clone(),
            Self::List(values) => values.join(","),
        }
    }
}

/// A source document loaded from the knowledge base.
///
/// Immutable after load. `id` is derived from the knowledge-base-relative
/// source path, so the same file always produces the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier derived from `source_path`.
    pub id: String,

    /// Path of the file this document was loaded from.
    pub source_path: PathBuf,

    /// Body text, with the header block stripped.
    pub raw_text: String,

    /// Parsed header metadata; empty when absent or malformed.
    pub frontmatter: Frontmatter,
}

impl Document {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        source_path: impl Into<PathBuf>,
        raw_text: impl Into<String>,
        frontmatter: Frontmatter,
    ) -> Self {
        Self {
            id: id.into(),
            source_path: source_path.into(),
            raw_text: raw_text.into(),
            frontmatter,
        }
    }

    /// Body length in characters (the unit the chunker budgets in).
    #[must_use]
    pub fn char_count(&self) -> usize {
        self.raw_text.chars().count()
    }
}

/// A bounded contiguous slice of a document's body text, the unit of
/// indexing and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic identifier: `{document_id}:{chunk_index}`.
    pub id: String,

    /// Id of the document this chunk was cut from.
    pub document_id: String,

    /// The chunk text.
    pub text: String,

    /// Start offset into the document body, in characters (inclusive).
    pub start_offset: usize,

    /// End offset into the document body, in characters (exclusive).
    pub end_offset: usize,

    /// Parent frontmatter plus position info.
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Build the deterministic chunk id for a document/index pair.
    ///
    /// Re-chunking an unchanged document reproduces identical ids, which is
    /// what makes reindexing idempotent.
    #[must_use]
    pub fn id_for(document_id: &str, index: usize) -> String {
        format!("{document_id}:{index}")
    }

    /// Chunk length in characters.
    #[must_use]
    pub fn char_count(&self) -> usize {
        self.end_offset - self.start_offset
    }
}

/// Metadata attached to every chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Union of the parent document's frontmatter.
    pub frontmatter: Frontmatter,

    /// Position of this chunk within its document (0-based).
    pub chunk_index: usize,

    /// Total number of chunks the document was cut into.
    pub chunk_count: usize,
}
