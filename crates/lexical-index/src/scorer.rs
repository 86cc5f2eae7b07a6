//! BM25 Okapi scoring over the inverted index.

use crate::index::IndexData;
use crate::tokenizer::tokenize;
use std::collections::HashMap;

/// Term-frequency saturation parameter.
pub const BM25_K1: f32 = 1.2;

/// Length-normalization strength.
pub const BM25_B: f32 = 0.75;

/// Score every chunk matching at least one query term. Returns
/// `internal id → accumulated BM25 score`; scores are unbounded positive.
pub(crate) fn bm25_scores(data: &IndexData, query: &str) -> HashMap<u32, f32> {
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() || data.chunk_count == 0 {
        return HashMap::new();
    }

    let average_length = data.average_length();
    let n = data.chunk_count as f32;

    let mut scores: HashMap<u32, f32> = HashMap::new();
    for token in &query_tokens {
        let Some(postings) = data.postings.get(token.as_str()) else {
            continue;
        };

        let df = postings.len() as f32;
        // IDF: log((N - df + 0.5) / (df + 0.5) + 1)
        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

        for posting in postings {
            let length = data
                .chunk_lengths
                .get(posting.internal as usize)
                .copied()
                .unwrap_or(0) as f32;
            let tf = posting.term_frequency as f32;

            let tf_norm =
                (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * length / average_length));
            *scores.entry(posting.internal).or_insert(0.0) += idf * tf_norm;
        }
    }

    scores
}
