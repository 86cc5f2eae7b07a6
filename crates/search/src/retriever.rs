use crate::error::{Result, SearchError};
use crate::fusion::WeightedFusion;
use crate::options::RetrievalOptions;
use kb_chunker::ChunkMetadata;
use kb_lexical_index::LexicalIndex;
use kb_vector_store::VectorStore;
use serde::Serialize;
use std::time::Duration;

/// How many candidates to pull from each index per final result slot.
/// Larger than 1 so overlap between the two sets still leaves k distinct
/// chunks to return.
const CANDIDATE_POOL_FACTOR: usize = 2;

/// One ranked retrieval candidate. Ephemeral: produced per query, never
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Raw cosine similarity, when the dense signal measured this chunk.
    pub vector_score: Option<f32>,
    /// Raw BM25 score, when the sparse signal matched this chunk.
    pub lexical_score: Option<f32>,
    pub fused_score: f32,
    /// 0-based position in the final ranking.
    pub rank: usize,
}

/// Hybrid retriever over one vector store and one lexical index.
///
/// Borrows both indexes read-only; queries never mutate shared state, so
/// any number of retrievals may run concurrently.
pub struct FusionRetriever<'a> {
    vector: &'a VectorStore,
    lexical: &'a LexicalIndex,
}

impl<'a> FusionRetriever<'a> {
    #[must_use]
    pub const fn new(vector: &'a VectorStore, lexical: &'a LexicalIndex) -> Self {
        Self { vector, lexical }
    }

    /// Run the fusion retrieval: both indexes queried concurrently,
    /// per-set min-max normalization, weighted combination, deterministic
    /// ordering, top `options.k` returned.
    pub async fn retrieve(
        &self,
        query: &str,
        options: &RetrievalOptions,
    ) -> Result<Vec<RetrievalResult>> {
        options.validate()?;
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let pool = options.k * CANDIDATE_POOL_FACTOR;
        log::debug!("Fusion retrieval: query='{query}', k={}, pool={pool}", options.k);

        // The two index queries are independent; the join is the only
        // synchronization point of the whole retrieval.
        let (vector_hits, lexical_hits) = tokio::join!(
            self.vector.query(query, pool),
            async { self.lexical.query(query, pool) },
        );
        let vector_hits = vector_hits?;
        log::debug!(
            "Candidates: {} vector, {} lexical",
            vector_hits.len(),
            lexical_hits.len()
        );

        let vector_pairs: Vec<(String, f32)> = vector_hits
            .into_iter()
            .map(|hit| (hit.chunk_id, hit.score))
            .collect();
        let lexical_pairs: Vec<(String, f32)> = lexical_hits
            .into_iter()
            .map(|hit| (hit.chunk_id, hit.score))
            .collect();

        let fusion = WeightedFusion::new(options.vector_weight, options.lexical_weight);
        let fused = fusion.fuse(&vector_pairs, &lexical_pairs, options.similarity_threshold);

        let mut results: Vec<RetrievalResult> = fused
            .into_iter()
            .filter_map(|candidate| match self.vector.get(&candidate.chunk_id) {
                Some(stored) => Some(RetrievalResult {
                    chunk_id: candidate.chunk_id,
                    text: stored.chunk.text.clone(),
                    metadata: stored.chunk.metadata.clone(),
                    vector_score: candidate.vector_score,
                    lexical_score: candidate.lexical_score,
                    fused_score: candidate.fused_score,
                    rank: 0,
                }),
                None => {
                    log::warn!(
                        "Chunk {} is indexed lexically but missing from the vector store; skipping",
                        candidate.chunk_id
                    );
                    None
                }
            })
            .take(options.k)
            .collect();

        for (rank, result) in results.iter_mut().enumerate() {
            result.rank = rank;
        }

        log::debug!("Fusion retrieval returned {} results", results.len());
        Ok(results)
    }

    /// `retrieve` with a caller deadline. On expiry the query fails with
    /// the retryable timeout error; indexes are read-only so no partial
    /// state is left behind.
    pub async fn retrieve_with_timeout(
        &self,
        query: &str,
        options: &RetrievalOptions,
        deadline: Duration,
    ) -> Result<Vec<RetrievalResult>> {
        tokio::time::timeout(deadline, self.retrieve(query, options))
            .await
            .map_err(|_| SearchError::Timeout(deadline))?
    }
}
