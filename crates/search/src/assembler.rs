use crate::retriever::RetrievalResult;
use kb_chunker::ChunkMetadata;
use serde::Serialize;

/// Separator between chunks in the assembled context.
pub const CONTEXT_DELIMITER: &str = "\n\n";

/// A chunk that made it into the assembled context, with its metadata so
/// the consumer can cite sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncludedChunk {
    pub chunk_id: String,
    pub metadata: ChunkMetadata,
}

/// The final product of a retrieval call: ranked chunk text serialized
/// under a hard character budget. Ephemeral, one per call.
///
/// An empty context is the "no relevant documents" outcome, not an error,
/// so callers can tell it apart from a system failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledContext {
    pub text: String,
    /// Chunks included, in ranked order.
    pub included: Vec<IncludedChunk>,
    /// Characters in `text`, delimiters counted. Never exceeds the budget.
    pub total_chars: usize,
    /// True iff at least one ranked candidate was excluded solely because
    /// of the budget.
    pub truncated: bool,
}

impl AssembledContext {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }
}

/// Greedy budgeted assembly of ranked chunks.
pub struct ContextAssembler {
    delimiter: String,
}

impl ContextAssembler {
    #[must_use]
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }

    /// Append chunk text in ranked order until the next chunk would push
    /// the total past `max_chars`, then stop; a chunk is never partially
    /// included, and assembly does not skip ahead to smaller chunks.
    ///
    /// A chunk whose text is a substring of an already-included chunk is a
    /// window-overlap duplicate and is dropped; that exclusion does not
    /// count as truncation.
    #[must_use]
    pub fn assemble(&self, results: &[RetrievalResult], max_chars: usize) -> AssembledContext {
        let delimiter_chars = self.delimiter.chars().count();

        let mut text = String::new();
        let mut included: Vec<IncludedChunk> = Vec::new();
        let mut included_texts: Vec<&str> = Vec::new();
        let mut total_chars = 0;
        let mut truncated = false;

        for result in results {
            if included_texts
                .iter()
                .any(|existing| existing.contains(result.text.as_str()))
            {
                log::debug!("Skipping {} (overlap duplicate)", result.chunk_id);
                continue;
            }

            let separator = if included.is_empty() {
                0
            } else {
                delimiter_chars
            };
            let chunk_chars = result.text.chars().count();
            if total_chars + separator + chunk_chars > max_chars {
                truncated = true;
                break;
            }

            if separator > 0 {
                text.push_str(&self.delimiter);
            }
            text.push_str(&result.text);
            total_chars += separator + chunk_chars;
            included_texts.push(result.text.as_str());
            included.push(IncludedChunk {
                chunk_id: result.chunk_id.clone(),
                metadata: result.metadata.clone(),
            });
        }

        log::debug!(
            "Assembled context: {} chunks, {total_chars} chars, truncated={truncated}",
            included.len()
        );
        AssembledContext {
            text,
            included,
            total_chars,
            truncated,
        }
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(CONTEXT_DELIMITER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn result(chunk_id: &str, text: String, rank: usize) -> RetrievalResult {
        RetrievalResult {
            chunk_id: chunk_id.to_string(),
            text,
            metadata: ChunkMetadata::default(),
            vector_score: Some(0.9),
            lexical_score: None,
            fused_score: 0.9,
            rank,
        }
    }

    #[test]
    fn budget_stops_at_first_overflow() {
        // 60 fits; 60 + delimiter + 50 overflows 100, and assembly stops
        // there rather than skipping ahead to the 40-char chunk.
        let results = vec![
            result("c1", "a".repeat(60), 0),
            result("c2", "b".repeat(50), 1),
            result("c3", "c".repeat(40), 2),
        ];

        let context = ContextAssembler::default().assemble(&results, 100);

        assert_eq!(context.included.len(), 1);
        assert_eq!(context.included[0].chunk_id, "c1");
        assert_eq!(context.total_chars, 60);
        assert!(context.truncated);
    }

    #[test]
    fn delimiter_counts_toward_budget() {
        let results = vec![
            result("c1", "a".repeat(60), 0),
            result("c2", "b".repeat(50), 1),
        ];

        // 60 + 2 + 50 = 112
        let fits = ContextAssembler::default().assemble(&results, 112);
        assert_eq!(fits.included.len(), 2);
        assert_eq!(fits.total_chars, 112);
        assert!(!fits.truncated);

        let overflows = ContextAssembler::default().assemble(&results, 111);
        assert_eq!(overflows.included.len(), 1);
        assert!(overflows.truncated);
    }

    #[test]
    fn total_never_exceeds_budget() {
        let results: Vec<RetrievalResult> = (0..20)
            .map(|i| result(&format!("c{i}"), format!("{i}-").repeat(i + 1), i))
            .collect();

        for budget in [0, 1, 10, 50, 200, 10_000] {
            let context = ContextAssembler::default().assemble(&results, budget);
            assert!(
                context.total_chars <= budget,
                "budget {budget} exceeded: {}",
                context.total_chars
            );
            assert_eq!(context.total_chars, context.text.chars().count());
        }
    }

    #[test]
    fn substring_duplicates_are_dropped_without_truncation() {
        let results = vec![
            result("c1", "the full overlapping window of text".to_string(), 0),
            // Substring of c1: a window-overlap duplicate.
            result("c2", "overlapping window".to_string(), 1),
            result("c3", "entirely different content".to_string(), 2),
        ];

        let context = ContextAssembler::default().assemble(&results, 1_000);

        let ids: Vec<&str> = context
            .included
            .iter()
            .map(|c| c.chunk_id.as_str())
            .collect();
        assert_eq!(ids, vec!["c1", "c3"]);
        assert!(!context.truncated);
    }

    #[test]
    fn empty_results_assemble_to_empty_context() {
        let context = ContextAssembler::default().assemble(&[], 100);
        assert!(context.is_empty());
        assert_eq!(context.text, "");
        assert_eq!(context.total_chars, 0);
        assert!(!context.truncated);
    }

    #[test]
    fn oversized_first_chunk_yields_empty_truncated_context() {
        let results = vec![result("c1", "x".repeat(500), 0)];
        let context = ContextAssembler::default().assemble(&results, 100);

        assert!(context.is_empty());
        assert!(context.truncated);
    }

    #[test]
    fn metadata_rides_along_for_citation() {
        let mut metadata = ChunkMetadata::default();
        metadata.frontmatter.insert(
            "title".to_string(),
            kb_chunker::FrontmatterValue::Text("Install guide".to_string()),
        );
        let mut r = result("c1", "body".to_string(), 0);
        r.metadata = metadata.clone();

        let context = ContextAssembler::default().assemble(&[r], 100);
        assert_eq!(context.included[0].metadata, metadata);
    }

    #[test]
    fn text_joins_chunks_with_delimiter() {
        let results = vec![
            result("c1", "first".to_string(), 0),
            result("c2", "second".to_string(), 1),
        ];

        let context = ContextAssembler::default().assemble(&results, 100);
        assert_eq!(context.text, "first\n\nsecond");
        assert_eq!(context.total_chars, 13);
    }
}
