use crate::error::{IndexerError, Result};
use crate::loader::DocumentLoader;
use crate::report::IndexingReport;
use kb_chunker::{Chunk, Chunker, ChunkerConfig};
use kb_lexical_index::LexicalIndex;
use kb_vector_store::{EmbeddingModel, VectorStore};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Offline ingestion pipeline: load documents, chunk them, and populate
/// both indexes of a knowledge base.
pub struct KnowledgeBaseIndexer {
    data_dir: PathBuf,
    chunker: Chunker,
    embedder: EmbeddingModel,
}

impl KnowledgeBaseIndexer {
    /// Create an indexer writing into `data_dir`, with the embedding
    /// backend selected by the environment.
    pub fn new(data_dir: impl AsRef<Path>, config: ChunkerConfig) -> Result<Self> {
        let embedder = EmbeddingModel::from_env()?;
        Self::with_embedder(data_dir, config, embedder)
    }

    /// Create an indexer with an explicit embedding model (tests use the
    /// stub backend).
    pub fn with_embedder(
        data_dir: impl AsRef<Path>,
        config: ChunkerConfig,
        embedder: EmbeddingModel,
    ) -> Result<Self> {
        Ok(Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            chunker: Chunker::new(config)?,
            embedder,
        })
    }

    /// Rebuild the knowledge base from a source directory.
    ///
    /// Per-file load failures are collected into the report and never abort
    /// the run. Each loaded document's previous chunks are removed from both
    /// indexes before its fresh chunks are upserted, so reindexing an
    /// unchanged tree is idempotent: same chunk ids, no duplicates.
    pub async fn reindex(&self, source_dir: impl AsRef<Path>) -> Result<IndexingReport> {
        let source_dir = source_dir.as_ref();
        if !source_dir.is_dir() {
            return Err(IndexerError::InvalidPath(format!(
                "not a directory: {}",
                source_dir.display()
            )));
        }

        let start = Instant::now();
        let mut report = IndexingReport::new();
        log::info!("Reindexing {}", source_dir.display());

        // 1. Load and chunk.
        let (documents, failures) = DocumentLoader::new(source_dir).load();
        for failure in failures {
            report.add_error(failure.path, failure.reason);
        }
        report.documents_loaded = documents.len();

        let mut chunks: Vec<Chunk> = Vec::new();
        for document in &documents {
            chunks.extend(self.chunker.chunk_document(document));
        }
        report.chunks_created = chunks.len();

        // 2. Open both stores and invalidate every loaded document's
        // previous chunks, whatever shape they had before.
        let mut vector = VectorStore::open(
            kb_vector_store::index_path(&self.data_dir),
            self.embedder.clone(),
        )
        .await?;
        let mut lexical = LexicalIndex::open(kb_lexical_index::index_path(&self.data_dir)).await?;

        for document in &documents {
            vector.remove_document(&document.id);
            lexical.remove_document(&document.id);
        }

        // 3. Populate both indexes. They own independent stores, so the
        // two upserts run in parallel.
        let (vector_result, ()) = tokio::join!(vector.upsert_chunks(&chunks), async {
            lexical.upsert_chunks(&chunks);
        });
        vector_result?;

        // 4. Persist. Saves are atomic (write-temp + rename), so a reader
        // never observes a half-written index.
        let (vector_saved, lexical_saved) = tokio::join!(vector.save(), lexical.save());
        vector_saved?;
        lexical_saved?;

        report.time_ms = start.elapsed().as_millis() as u64;
        log::info!("Reindex complete: {report}");
        Ok(report)
    }

    #[must_use]
    pub const fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }
}
