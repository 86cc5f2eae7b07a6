use crate::config::ChunkerConfig;
use crate::error::Result;
use crate::types::{Chunk, ChunkMetadata, Document};

/// How far back from the target cut point we look for a whitespace
/// boundary before giving up and cutting mid-word.
const BOUNDARY_LOOKBACK: usize = 64;

/// Splits document bodies into overlapping fixed-size chunks.
///
/// All window arithmetic is in characters, never bytes, so multi-byte text
/// is never cut inside a code point.
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a new chunker. The configuration is validated here so that
    /// an invalid chunk/overlap combination fails before any work starts.
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get configuration
    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk a document's body text.
    ///
    /// Returns no chunks for an empty body. When chunking is disabled the
    /// whole body becomes one chunk. Otherwise a sliding window of
    /// `chunk_size` characters advances by `chunk_size - overlap`, preferring
    /// to cut at a whitespace boundary near the target cut point. The final
    /// chunk holds the remaining text and is never empty.
    #[must_use]
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        let body = document.raw_text.as_str();
        if body.is_empty() {
            log::debug!("Document {} has an empty body, nothing to chunk", document.id);
            return Vec::new();
        }

        // Byte offset of every char boundary, plus the end sentinel. Spans
        // below index into this table so offsets stay in character units.
        let boundaries: Vec<usize> = body
            .char_indices()
            .map(|(byte, _)| byte)
            .chain(std::iter::once(body.len()))
            .collect();
        let total_chars = boundaries.len() - 1;

        let spans = if self.config.enabled {
            self.window_spans(body, &boundaries, total_chars)
        } else {
            vec![(0, total_chars)]
        };

        let chunk_count = spans.len();
        spans
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| {
                let text = body[boundaries[start]..boundaries[end]].to_string();
                Chunk {
                    id: Chunk::id_for(&document.id, index),
                    document_id: document.id.clone(),
                    text,
                    start_offset: start,
                    end_offset: end,
                    metadata: ChunkMetadata {
                        frontmatter: document.frontmatter.clone(),
                        chunk_index: index,
                        chunk_count,
                    },
                }
            })
            .collect()
    }

    /// Compute `(start, end)` character spans for the sliding window.
    ///
    /// Invariants: spans are non-empty, starts are strictly increasing, and
    /// consecutive spans share exactly `end - next_start` characters of
    /// overlap (at most `overlap`, by construction).
    fn window_spans(
        &self,
        body: &str,
        boundaries: &[usize],
        total_chars: usize,
    ) -> Vec<(usize, usize)> {
        let size = self.config.chunk_size;
        let overlap = self.config.overlap;

        let mut spans = Vec::new();
        let mut start = 0;
        loop {
            let hard_end = (start + size).min(total_chars);
            let end = if hard_end < total_chars {
                self.snap_to_whitespace(body, boundaries, start, hard_end)
            } else {
                hard_end
            };

            spans.push((start, end));
            if end >= total_chars {
                break;
            }
            start = end - overlap;
        }
        spans
    }

    /// Prefer the last whitespace within `BOUNDARY_LOOKBACK` characters of
    /// the target cut point; cut right after it so words stay intact. Falls
    /// back to the exact cut point, and never shrinks the window so far that
    /// it stops advancing.
    fn snap_to_whitespace(
        &self,
        body: &str,
        boundaries: &[usize],
        start: usize,
        hard_end: usize,
    ) -> usize {
        let lookback_floor = hard_end.saturating_sub(BOUNDARY_LOOKBACK);
        // The next window starts at `end - overlap`; anything at or below
        // `start + overlap + 1` would make the step non-positive.
        let min_end = (start + self.config.overlap + 1).max(lookback_floor);

        for candidate in (min_end..=hard_end).rev() {
            let byte = boundaries[candidate - 1];
            let ch = body[byte..].chars().next();
            if ch.is_some_and(char::is_whitespace) {
                return candidate;
            }
        }
        hard_end
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            config: ChunkerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Frontmatter, FrontmatterValue};
    use pretty_assertions::assert_eq;

    fn doc(id: &str, body: &str) -> Document {
        Document::new(id, format!("{id}.md"), body, Frontmatter::new())
    }

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig {
            enabled: true,
            chunk_size: size,
            overlap,
        })
        .unwrap()
    }

    #[test]
    fn disabled_chunking_returns_single_chunk() {
        let chunker = Chunker::new(ChunkerConfig::pass_through()).unwrap();
        let document = doc("d1", "some body text of modest length");

        let chunks = chunker.chunk_document(&document);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, document.raw_text);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].end_offset, document.char_count());
        assert_eq!(chunks[0].metadata.chunk_count, 1);
    }

    #[test]
    fn empty_body_yields_no_chunks() {
        let chunker = Chunker::default();
        assert!(chunker.chunk_document(&doc("d1", "")).is_empty());
    }

    #[test]
    fn invalid_config_is_rejected_not_looped() {
        let result = Chunker::new(ChunkerConfig {
            enabled: true,
            chunk_size: 100,
            overlap: 100,
        });
        assert!(result.is_err());
    }

    #[test]
    fn exact_window_without_whitespace() {
        // No whitespace anywhere, so no boundary snapping: offsets land
        // exactly on the size/step grid.
        let body = "x".repeat(5000);
        let chunks = chunker(2000, 200).chunk_document(&doc("d1", &body));

        let spans: Vec<(usize, usize)> = chunks
            .iter()
            .map(|c| (c.start_offset, c.end_offset))
            .collect();
        assert_eq!(spans, vec![(0, 2000), (1800, 3800), (3600, 5000)]);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert_eq!(chunk.metadata.chunk_count, 3);
        }
    }

    #[test]
    fn frontmatter_carried_on_every_chunk() {
        let mut frontmatter = Frontmatter::new();
        frontmatter.insert(
            "title".to_string(),
            FrontmatterValue::Text("X".to_string()),
        );
        let body = "x".repeat(5000);
        let document = Document::new("d1", "d1.md", body, frontmatter);

        let chunks = chunker(2000, 200).chunk_document(&document);

        assert_eq!(chunks.len(), 3);
        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(
                chunk.metadata.frontmatter.get("title"),
                Some(&FrontmatterValue::Text("X".to_string()))
            );
            assert_eq!(chunk.metadata.chunk_index, index);
            assert_eq!(chunk.id, format!("d1:{index}"));
        }
    }

    #[test]
    fn prefers_whitespace_boundary_near_cut_point() {
        // 95 chars then a space then more text; cutting at 100 would land
        // mid-word, so the chunker should cut just after the space.
        let body = format!("{} {}", "a".repeat(95), "b".repeat(100));
        let chunks = chunker(100, 10).chunk_document(&doc("d1", &body));

        assert_eq!(chunks[0].end_offset, 96);
        assert!(chunks[0].text.ends_with(' '));
        assert_eq!(chunks[1].start_offset, 86);
    }

    #[test]
    fn cuts_exactly_when_no_whitespace_in_lookback() {
        let body = "a".repeat(300);
        let chunks = chunker(100, 10).chunk_document(&doc("d1", &body));
        assert_eq!(chunks[0].end_offset, 100);
        assert_eq!(chunks[1].start_offset, 90);
    }

    #[test]
    fn offsets_are_monotonic_and_overlap_bounded() {
        let body = "the quick brown fox jumps over the lazy dog ".repeat(50);
        let config = ChunkerConfig {
            enabled: true,
            chunk_size: 120,
            overlap: 30,
        };
        let chunks = Chunker::new(config.clone())
            .unwrap()
            .chunk_document(&doc("d1", &body));

        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset > pair[0].start_offset);
            assert!(pair[1].start_offset <= pair[0].end_offset);
            let shared = pair[0].end_offset - pair[1].start_offset;
            assert!(shared <= config.overlap);
        }
        for chunk in &chunks {
            assert!(!chunk.text.is_empty());
            assert!(chunk.char_count() <= config.chunk_size);
        }
    }

    #[test]
    fn multibyte_text_never_splits_a_code_point() {
        let body = "é".repeat(250);
        let chunks = chunker(100, 20).chunk_document(&doc("d1", &body));

        assert_eq!(chunks[0].char_count(), 100);
        let reassembled: usize = chunks.last().unwrap().end_offset;
        assert_eq!(reassembled, 250);
        for chunk in &chunks {
            assert!(chunk.text.chars().all(|c| c == 'é'));
        }
    }

    #[test]
    fn rechunking_reproduces_identical_ids() {
        let body = "lorem ipsum dolor sit amet ".repeat(100);
        let document = doc("d1", &body);
        let chunker = chunker(200, 40);

        let first = chunker.chunk_document(&document);
        let second = chunker.chunk_document(&document);

        let first_ids: Vec<&str> = first.iter().map(|c| c.id.as_str()).collect();
        let second_ids: Vec<&str> = second.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
        assert_eq!(first, second);
    }
}
