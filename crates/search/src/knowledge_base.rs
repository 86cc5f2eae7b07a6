use crate::assembler::{AssembledContext, ContextAssembler};
use crate::error::Result;
use crate::options::RetrievalOptions;
use crate::retriever::FusionRetriever;
use kb_lexical_index::LexicalIndex;
use kb_vector_store::{EmbeddingModel, VectorStore};
use std::path::Path;

/// An opened knowledge base: one vector store plus one lexical index with
/// an explicit lifecycle.
///
/// Indexes are owned objects passed into the retriever by reference, never
/// ambient globals: a process can hold any number of independent knowledge
/// bases, and tests run against ephemeral ones in temp dirs.
pub struct KnowledgeBase {
    vector: VectorStore,
    lexical: LexicalIndex,
}

impl KnowledgeBase {
    /// Open the knowledge base stored in `data_dir`, with the embedding
    /// backend selected by the environment.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let embedder = EmbeddingModel::from_env()?;
        Self::open_with_embedder(data_dir, embedder).await
    }

    /// Open with an explicit embedding model (tests use the stub backend).
    pub async fn open_with_embedder(
        data_dir: impl AsRef<Path>,
        embedder: EmbeddingModel,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let vector = VectorStore::open(kb_vector_store::index_path(data_dir), embedder).await?;
        let lexical = LexicalIndex::open(kb_lexical_index::index_path(data_dir)).await?;

        log::info!(
            "Opened knowledge base at {} ({} vector, {} lexical chunks)",
            data_dir.display(),
            vector.len(),
            lexical.len()
        );
        Ok(Self { vector, lexical })
    }

    /// Retrieve and assemble context for a query.
    ///
    /// Returns an empty [`AssembledContext`] when nothing relevant was
    /// found; that is a successful outcome, distinct from every error in
    /// [`crate::SearchError`].
    pub async fn retrieve_context(
        &self,
        query: &str,
        options: &RetrievalOptions,
    ) -> Result<AssembledContext> {
        let retriever = FusionRetriever::new(&self.vector, &self.lexical);
        let results = match options.timeout {
            Some(deadline) => retriever.retrieve_with_timeout(query, options, deadline).await?,
            None => retriever.retrieve(query, options).await?,
        };

        if results.is_empty() {
            log::debug!("No relevant chunks for query");
        }
        Ok(ContextAssembler::default().assemble(&results, options.max_context_chars))
    }

    #[must_use]
    pub const fn vector_store(&self) -> &VectorStore {
        &self.vector
    }

    #[must_use]
    pub const fn lexical_index(&self) -> &LexicalIndex {
        &self.lexical
    }

    /// Persist both indexes and release the handle.
    pub async fn close(self) -> Result<()> {
        let (vector, lexical) = tokio::join!(self.vector.save(), self.lexical.save());
        vector?;
        lexical?;
        Ok(())
    }
}
