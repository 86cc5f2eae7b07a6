//! Weighted score fusion of the dense and sparse candidate sets.
//!
//! The two signals live on different scales (cosine similarity is bounded,
//! BM25 is unbounded positive), so each set is min-max normalized to
//! [0, 1] *within that set* before combining. Skipping that step silently
//! biases the ensemble toward whichever scale happens to be larger;
//! normalization is a standalone, independently tested function rather
//! than a line inside the merge loop.

use std::collections::{BTreeSet, HashMap};

/// Min-max normalize scores to [0, 1] within this result set.
///
/// A set with a single distinct value (including a singleton) normalizes to
/// 1.0 everywhere: those candidates are the best the signal produced.
#[must_use]
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }

    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    if range <= f32::EPSILON {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / range).collect()
}

/// A chunk scored by the fusion of both signals.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub chunk_id: String,
    /// Raw cosine similarity, when the chunk appeared in the vector set.
    pub vector_score: Option<f32>,
    /// Raw BM25 score, when the chunk appeared in the lexical set.
    pub lexical_score: Option<f32>,
    pub fused_score: f32,
}

/// Weighted combination of normalized vector and lexical scores.
pub struct WeightedFusion {
    vector_weight: f32,
    lexical_weight: f32,
}

impl WeightedFusion {
    #[must_use]
    pub const fn new(vector_weight: f32, lexical_weight: f32) -> Self {
        Self {
            vector_weight,
            lexical_weight,
        }
    }

    /// Fuse two candidate sets of `(chunk_id, raw_score)` pairs.
    ///
    /// For the union of ids: `fused = vw * norm_vector + lw * norm_lexical`,
    /// where a chunk absent from one set contributes 0 for that signal;
    /// absence is never a penalty and presence in both is not required.
    ///
    /// Candidates whose *raw* vector similarity falls below
    /// `similarity_threshold` are dropped, but only when a vector score
    /// actually exists: the threshold protects against semantically
    /// irrelevant lexical matches, so a lexical-only candidate (which the
    /// dense signal never measured) passes through.
    ///
    /// Ordering is deterministic: fused score descending, then raw vector
    /// score descending, then chunk id ascending.
    #[must_use]
    pub fn fuse(
        &self,
        vector_results: &[(String, f32)],
        lexical_results: &[(String, f32)],
        similarity_threshold: f32,
    ) -> Vec<FusedCandidate> {
        let vector_scores: Vec<f32> = vector_results.iter().map(|(_, s)| *s).collect();
        let lexical_scores: Vec<f32> = lexical_results.iter().map(|(_, s)| *s).collect();
        let vector_norms = min_max_normalize(&vector_scores);
        let lexical_norms = min_max_normalize(&lexical_scores);

        let vector_map: HashMap<&str, (f32, f32)> = vector_results
            .iter()
            .zip(vector_norms)
            .map(|((id, raw), norm)| (id.as_str(), (*raw, norm)))
            .collect();
        let lexical_map: HashMap<&str, (f32, f32)> = lexical_results
            .iter()
            .zip(lexical_norms)
            .map(|((id, raw), norm)| (id.as_str(), (*raw, norm)))
            .collect();

        let ids: BTreeSet<&str> = vector_map
            .keys()
            .chain(lexical_map.keys())
            .copied()
            .collect();

        let mut candidates: Vec<FusedCandidate> = ids
            .into_iter()
            .filter_map(|id| {
                let vector = vector_map.get(id).copied();
                let lexical = lexical_map.get(id).copied();

                if let Some((raw, _)) = vector {
                    if raw < similarity_threshold {
                        return None;
                    }
                }

                let fused_score = self.vector_weight * vector.map_or(0.0, |(_, n)| n)
                    + self.lexical_weight * lexical.map_or(0.0, |(_, n)| n);

                Some(FusedCandidate {
                    chunk_id: id.to_string(),
                    vector_score: vector.map(|(raw, _)| raw),
                    lexical_score: lexical.map(|(raw, _)| raw),
                    fused_score,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.fused_score
                .partial_cmp(&a.fused_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let av = a.vector_score.unwrap_or(f32::NEG_INFINITY);
                    let bv = b.vector_score.unwrap_or(f32::NEG_INFINITY);
                    bv.partial_cmp(&av).unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });

        candidates
    }
}

impl Default for WeightedFusion {
    fn default() -> Self {
        Self::new(0.6, 0.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(raw: &[(&str, f32)]) -> Vec<(String, f32)> {
        raw.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn normalize_empty() {
        assert!(min_max_normalize(&[]).is_empty());
    }

    #[test]
    fn normalize_singleton_is_one() {
        assert_eq!(min_max_normalize(&[8.0]), vec![1.0]);
    }

    #[test]
    fn normalize_constant_set_is_one() {
        assert_eq!(min_max_normalize(&[3.0, 3.0, 3.0]), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn normalize_spreads_to_unit_interval() {
        let normalized = min_max_normalize(&[2.0, 4.0, 6.0]);
        assert_eq!(normalized, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn lexical_only_candidate_scores_with_zero_vector_component() {
        // A chunk in the lexical top-k with BM25 8.0 (singleton set, so it
        // normalizes to 1.0) and no vector score at all: fused must be
        // 0.4 * 1.0 + 0.6 * 0 = 0.4, and the similarity threshold must not
        // filter it, since no vector score exists to compare against.
        let fusion = WeightedFusion::new(0.6, 0.4);
        let fused = fusion.fuse(&[], &pairs(&[("d1:0", 8.0)]), 0.5);

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].chunk_id, "d1:0");
        assert_eq!(fused[0].vector_score, None);
        assert_eq!(fused[0].lexical_score, Some(8.0));
        assert!((fused[0].fused_score - 0.4).abs() < 1e-6);
    }

    #[test]
    fn threshold_filters_only_measured_vector_scores() {
        let fusion = WeightedFusion::new(0.6, 0.4);
        let vector = pairs(&[("low", 0.2), ("high", 0.9)]);
        let lexical = pairs(&[("low", 5.0), ("lexical_only", 4.0)]);

        let fused = fusion.fuse(&vector, &lexical, 0.5);
        let ids: Vec<&str> = fused.iter().map(|c| c.chunk_id.as_str()).collect();

        // "low" has a measured vector score below the threshold: dropped,
        // even though it also matched lexically. "lexical_only" survives.
        assert!(ids.contains(&"high"));
        assert!(ids.contains(&"lexical_only"));
        assert!(!ids.contains(&"low"));
    }

    #[test]
    fn absence_is_zero_not_penalty() {
        let fusion = WeightedFusion::new(0.5, 0.5);
        let fused = fusion.fuse(&pairs(&[("v_only", 0.8)]), &pairs(&[("l_only", 3.0)]), -1.0);

        for candidate in &fused {
            assert!(candidate.fused_score >= 0.0);
            assert!((candidate.fused_score - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn fusion_is_deterministic_including_tie_order() {
        let fusion = WeightedFusion::default();
        let vector = pairs(&[("b", 0.7), ("a", 0.7), ("c", 0.9)]);
        let lexical = pairs(&[("d", 2.0), ("b", 1.0)]);

        let first = fusion.fuse(&vector, &lexical, 0.0);
        let second = fusion.fuse(&vector, &lexical, 0.0);
        assert_eq!(first, second);

        // Equal-fused candidates must come out ordered by vector score
        // then chunk id.
        let constant = fusion.fuse(&pairs(&[("b", 0.5), ("a", 0.5)]), &[], 0.0);
        let ids: Vec<&str> = constant.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn raising_vector_weight_never_demotes_vector_heavy_chunks() {
        // "a" scores higher on the vector signal than on the lexical one;
        // shifting weight from lexical to vector must not lower its rank.
        let vector = pairs(&[("a", 0.9), ("b", 0.4), ("c", 0.6)]);
        let lexical = pairs(&[("a", 0.2), ("b", 0.8), ("c", 0.6)]);

        let rank_of = |vw: f32, lw: f32| -> usize {
            WeightedFusion::new(vw, lw)
                .fuse(&vector, &lexical, -1.0)
                .iter()
                .position(|c| c.chunk_id == "a")
                .expect("candidate a present")
        };

        let balanced = rank_of(0.5, 0.5);
        let vector_heavy = rank_of(0.7, 0.3);
        assert!(vector_heavy <= balanced);
    }
}
