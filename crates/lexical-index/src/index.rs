use crate::error::Result;
use crate::scorer;
use crate::tokenizer::tokenize;
use kb_chunker::Chunk;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Filename of the lexical index inside a knowledge base's data directory.
pub const LEXICAL_INDEX_FILE: &str = "lexical_index.json";

/// Default lexical index path for a data directory.
#[must_use]
pub fn index_path(data_dir: impl AsRef<Path>) -> PathBuf {
    data_dir.as_ref().join(LEXICAL_INDEX_FILE)
}

/// A single entry in a term's postings list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Posting {
    /// Internal u32 id of the chunk.
    pub internal: u32,
    /// Number of times the term appears in the chunk.
    pub term_frequency: u32,
}

/// Persisted reference from a chunk id to its internal id and owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChunkRef {
    internal: u32,
    document_id: String,
}

/// The serialized index state. Chunks get compact internal u32 ids;
/// `refs`/`labels` map between those and the public chunk ids.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct IndexData {
    pub(crate) postings: BTreeMap<String, Vec<Posting>>,
    pub(crate) chunk_lengths: Vec<u32>,
    pub(crate) chunk_count: u32,
    pub(crate) total_length: u64,
    refs: BTreeMap<String, ChunkRef>,
    labels: Vec<Option<String>>,
}

impl IndexData {
    /// Average indexed chunk length in tokens (BM25 length normalization).
    pub(crate) fn average_length(&self) -> f32 {
        if self.chunk_count == 0 {
            return 0.0;
        }
        self.total_length as f32 / self.chunk_count as f32
    }

    fn add(&mut self, internal: u32, text: &str) {
        let tokens = tokenize(text);
        let length = tokens.len() as u32;

        let idx = internal as usize;
        if idx >= self.chunk_lengths.len() {
            self.chunk_lengths.resize(idx + 1, 0);
        }
        self.chunk_lengths[idx] = length;
        self.chunk_count += 1;
        self.total_length += u64::from(length);

        let mut frequencies: HashMap<&str, u32> = HashMap::new();
        for token in &tokens {
            *frequencies.entry(token.as_str()).or_insert(0) += 1;
        }

        for (term, term_frequency) in frequencies {
            self.postings.entry(term.to_string()).or_default().push(Posting {
                internal,
                term_frequency,
            });
        }
    }

    fn remove(&mut self, internal: u32) {
        let idx = internal as usize;
        if let Some(label) = self.labels.get_mut(idx) {
            *label = None;
        }
        let Some(length) = self.chunk_lengths.get(idx).copied() else {
            return;
        };

        self.chunk_lengths[idx] = 0;
        self.chunk_count = self.chunk_count.saturating_sub(1);
        self.total_length -= u64::from(length);

        // Zero-length chunks never contributed postings.
        if length > 0 {
            self.postings.retain(|_, postings| {
                postings.retain(|p| p.internal != internal);
                !postings.is_empty()
            });
        }
    }
}

/// One lexical-query candidate: a chunk id and its BM25 score.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub chunk_id: String,
    pub score: f32,
}

/// Sparse BM25 index over chunk text, keyed by chunk id.
///
/// Term postings are derived from tokenized chunk text; re-upserting a
/// chunk with the same id replaces its postings so reindexing never
/// duplicates entries.
pub struct LexicalIndex {
    data: IndexData,
    path: PathBuf,
}

impl LexicalIndex {
    /// Open the index at `path`, loading existing state if the file exists
    /// and starting empty otherwise.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let raw = tokio::fs::read_to_string(&path).await?;
            let data: IndexData = serde_json::from_str(&raw)?;
            log::info!(
                "Loaded lexical index with {} chunks from {}",
                data.refs.len(),
                path.display()
            );
            data
        } else {
            log::info!("Creating new lexical index at {}", path.display());
            IndexData::default()
        };

        Ok(Self { data, path })
    }

    /// Index chunks, replacing any previous postings for the same ids.
    pub fn upsert_chunks(&mut self, chunks: &[Chunk]) {
        if chunks.is_empty() {
            return;
        }

        log::info!("Upserting {} chunks into lexical index", chunks.len());
        for chunk in chunks {
            self.remove_chunk(&chunk.id);

            let internal = self.data.labels.len() as u32;
            self.data.labels.push(Some(chunk.id.clone()));
            self.data.refs.insert(
                chunk.id.clone(),
                ChunkRef {
                    internal,
                    document_id: chunk.document_id.clone(),
                },
            );
            self.data.add(internal, &chunk.text);
        }
    }

    fn remove_chunk(&mut self, chunk_id: &str) {
        if let Some(entry) = self.data.refs.remove(chunk_id) {
            self.data.remove(entry.internal);
        }
    }

    /// Drop every chunk belonging to `document_id`. Returns how many were
    /// removed.
    pub fn remove_document(&mut self, document_id: &str) -> usize {
        let stale: Vec<String> = self
            .data
            .refs
            .iter()
            .filter(|(_, entry)| entry.document_id == document_id)
            .map(|(chunk_id, _)| chunk_id.clone())
            .collect();

        for chunk_id in &stale {
            self.remove_chunk(chunk_id);
        }
        if !stale.is_empty() {
            log::debug!("Removed {} chunks of document {document_id}", stale.len());
        }
        stale.len()
    }

    /// Score the query with BM25 and return up to `k` chunk ids sorted by
    /// score descending (ties by chunk id ascending). Scores are unbounded
    /// positive; callers combining them with another signal must normalize.
    #[must_use]
    pub fn query(&self, text: &str, k: usize) -> Vec<LexicalHit> {
        if k == 0 {
            return Vec::new();
        }

        let scores = scorer::bm25_scores(&self.data, text);
        let mut hits: Vec<LexicalHit> = scores
            .into_iter()
            .filter_map(|(internal, score)| {
                let label = self.data.labels.get(internal as usize)?.as_ref()?;
                Some(LexicalHit {
                    chunk_id: label.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by_key(|hit| (Reverse(OrderedFloat(hit.score)), hit.chunk_id.clone()));
        hits.truncate(k);

        log::debug!("Lexical query returned {} hits", hits.len());
        hits
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.refs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.refs.is_empty()
    }

    /// All indexed chunk ids, ascending.
    #[must_use]
    pub fn chunk_ids(&self) -> Vec<String> {
        self.data.refs.keys().cloned().collect()
    }

    /// Persist to disk. Writes a temporary sibling file and renames it so
    /// concurrent readers never observe a half-written index.
    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let raw = serde_json::to_string_pretty(&self.data)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        log::info!(
            "Saved lexical index ({} chunks) to {}",
            self.data.refs.len(),
            self.path.display()
        );
        Ok(())
    }
}
