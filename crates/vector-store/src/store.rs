use crate::embeddings::EmbeddingModel;
use crate::error::Result;
use crate::types::{StoredChunk, VectorHit};
use kb_chunker::Chunk;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Filename of the vector index inside a knowledge base's data directory.
pub const VECTOR_INDEX_FILE: &str = "vector_index.json";

/// Default vector index path for a data directory.
#[must_use]
pub fn index_path(data_dir: impl AsRef<Path>) -> PathBuf {
    data_dir.as_ref().join(VECTOR_INDEX_FILE)
}

/// Dense index: one embedding per chunk, keyed by chunk id.
///
/// Entries are held in a `BTreeMap` so persistence and query iteration are
/// deterministic. Queries are an exact cosine scan; ties break by chunk id
/// ascending so identical inputs always produce identical orderings.
pub struct VectorStore {
    chunks: BTreeMap<String, StoredChunk>,
    embedder: EmbeddingModel,
    path: PathBuf,
}

impl VectorStore {
    /// Open the store at `path`, loading existing entries if the file
    /// exists and starting empty otherwise.
    pub async fn open(path: impl AsRef<Path>, embedder: EmbeddingModel) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let chunks = if path.exists() {
            let data = tokio::fs::read_to_string(&path).await?;
            let chunks: BTreeMap<String, StoredChunk> = serde_json::from_str(&data)?;
            log::info!("Loaded vector index with {} chunks from {}", chunks.len(), path.display());
            chunks
        } else {
            log::info!("Creating new vector index at {}", path.display());
            BTreeMap::new()
        };

        Ok(Self {
            chunks,
            embedder,
            path,
        })
    }

    /// Embed and insert chunks, overwriting entries with the same chunk id.
    /// Embeddings are computed in batches.
    pub async fn upsert_chunks(&mut self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        log::info!("Upserting {} chunks into vector index", chunks.len());
        let contents: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embedder.embed_batch(contents).await?;
        if vectors.len() != chunks.len() {
            log::warn!(
                "Embedding batch returned {} vectors for {} chunks; extra chunks skipped",
                vectors.len(),
                chunks.len()
            );
        }

        for (chunk, embedding) in chunks.iter().zip(vectors.into_iter()) {
            self.chunks.insert(
                chunk.id.clone(),
                StoredChunk {
                    chunk: chunk.clone(),
                    embedding,
                },
            );
        }

        Ok(())
    }

    /// Drop every chunk belonging to `document_id`. Returns how many were
    /// removed.
    pub fn remove_document(&mut self, document_id: &str) -> usize {
        let before = self.chunks.len();
        self.chunks
            .retain(|_, stored| stored.chunk.document_id != document_id);
        let removed = before - self.chunks.len();
        if removed > 0 {
            log::debug!("Removed {removed} chunks of document {document_id}");
        }
        removed
    }

    /// Embed the query and return up to `k` chunk ids with cosine
    /// similarity, sorted descending (ties by chunk id ascending).
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<VectorHit>> {
        if k == 0 || self.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(text).await?;

        let mut hits: Vec<VectorHit> = self
            .chunks
            .values()
            .map(|stored| VectorHit {
                chunk_id: stored.chunk.id.clone(),
                score: EmbeddingModel::cosine_similarity(&query_vector, &stored.embedding),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);

        log::debug!("Vector query returned {} hits", hits.len());
        Ok(hits)
    }

    /// Get a stored chunk by id.
    #[must_use]
    pub fn get(&self, chunk_id: &str) -> Option<&StoredChunk> {
        self.chunks.get(chunk_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// All stored chunk ids, ascending.
    #[must_use]
    pub fn chunk_ids(&self) -> Vec<String> {
        self.chunks.keys().cloned().collect()
    }

    /// Persist to disk. Writes a temporary sibling file and renames it so
    /// concurrent readers never observe a half-written index.
    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_string_pretty(&self.chunks)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        log::info!(
            "Saved vector index ({} chunks) to {}",
            self.chunks.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_chunker::{ChunkMetadata, Frontmatter};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn test_chunk(document_id: &str, index: usize, text: &str) -> Chunk {
        Chunk {
            id: Chunk::id_for(document_id, index),
            document_id: document_id.to_string(),
            text: text.to_string(),
            start_offset: 0,
            end_offset: text.chars().count(),
            metadata: ChunkMetadata {
                frontmatter: Frontmatter::new(),
                chunk_index: index,
                chunk_count: 1,
            },
        }
    }

    async fn open_store(dir: &TempDir) -> VectorStore {
        VectorStore::open(index_path(dir.path()), EmbeddingModel::stub(64))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn upsert_and_query() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir).await;

        let chunks = vec![
            test_chunk("d1", 0, "how to configure the vpn client"),
            test_chunk("d1", 1, "printer troubleshooting steps"),
            test_chunk("d2", 0, "reset your password from the portal"),
        ];
        store.upsert_chunks(&chunks).await.unwrap();
        assert_eq!(store.len(), 3);

        let hits = store
            .query("how to configure the vpn client", 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        // Identical text embeds identically under the stub backend, so the
        // exact-match chunk must rank first with similarity ~1.
        assert_eq!(hits[0].chunk_id, "d1:0");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn reupsert_overwrites_without_duplication() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir).await;

        let chunk = test_chunk("d1", 0, "original text");
        store.upsert_chunks(std::slice::from_ref(&chunk)).await.unwrap();
        assert_eq!(store.len(), 1);

        let updated = test_chunk("d1", 0, "rewritten text");
        store.upsert_chunks(std::slice::from_ref(&updated)).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("d1:0").unwrap().chunk.text, "rewritten text");
    }

    #[tokio::test]
    async fn remove_document_drops_all_its_chunks() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir).await;

        let chunks = vec![
            test_chunk("d1", 0, "alpha"),
            test_chunk("d1", 1, "beta"),
            test_chunk("d2", 0, "gamma"),
        ];
        store.upsert_chunks(&chunks).await.unwrap();

        assert_eq!(store.remove_document("d1"), 2);
        assert_eq!(store.len(), 1);
        assert!(store.get("d2:0").is_some());
        assert_eq!(store.remove_document("d1"), 0);
    }

    #[tokio::test]
    async fn save_and_reload_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = index_path(dir.path());

        {
            let mut store = VectorStore::open(&path, EmbeddingModel::stub(64))
                .await
                .unwrap();
            store
                .upsert_chunks(&[test_chunk("d1", 0, "persisted text")])
                .await
                .unwrap();
            store.save().await.unwrap();
        }

        let reloaded = VectorStore::open(&path, EmbeddingModel::stub(64))
            .await
            .unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("d1:0").unwrap().chunk.text, "persisted text");

        let hits = reloaded.query("persisted text", 1).await.unwrap();
        assert_eq!(hits[0].chunk_id, "d1:0");
    }

    #[tokio::test]
    async fn query_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir).await;

        let chunks: Vec<Chunk> = (0..10)
            .map(|i| test_chunk("d1", i, &format!("chunk number {i}")))
            .collect();
        store.upsert_chunks(&chunks).await.unwrap();

        let first = store.query("chunk number", 10).await.unwrap();
        let second = store.query("chunk number", 10).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn duplicate_texts_tie_break_by_chunk_id() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir).await;

        // Same text everywhere: every similarity ties, so ordering must
        // fall back to ascending chunk id.
        let chunks = vec![
            test_chunk("d2", 0, "identical"),
            test_chunk("d1", 1, "identical"),
            test_chunk("d1", 0, "identical"),
        ];
        store.upsert_chunks(&chunks).await.unwrap();

        let hits = store.query("identical", 3).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["d1:0", "d1:1", "d2:0"]);
    }
}
