//! Page-block chunking for retrieval indexing.

use serde::Serialize;

/// Chunking tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    /// Number of consecutive pages grouped into one chunk. Values below 1 are
    /// treated as 1; a value at or above the page count yields a single chunk
    /// spanning the whole document.
    pub block_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { block_size: 2 }
    }
}

/// Retrievable unit of document text spanning one or more source pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// Monotonic identifier assigned in document order.
    pub chunk_id: usize,
    /// Covered page texts joined with newlines.
    pub text: String,
    /// Index of the first source page covered by this chunk.
    pub page_start: usize,
    /// Exclusive index one past the last covered page.
    pub page_end: usize,
    /// Rough token estimate (whitespace word count).
    pub token_estimate: usize,
}

/// Partitions `pages` into consecutive blocks of `config.block_size` pages.
///
/// Pages without usable text are excluded before grouping, so chunk count is
/// `ceil(usable_pages / block_size)` and the final chunk may cover fewer
/// pages. Page order is preserved and blocks do not overlap. Returns an empty
/// vector when no page has usable text; callers must treat that as "no
/// retrievable content" rather than building an empty index.
pub fn chunk_pages(pages: &[String], config: &ChunkerConfig) -> Vec<Chunk> {
    let block_size = config.block_size.max(1);
    let usable: Vec<(usize, &str)> = pages
        .iter()
        .enumerate()
        .map(|(page_idx, page)| (page_idx, page.as_str()))
        .filter(|(_, page)| !page.trim().is_empty())
        .collect();

    usable
        .chunks(block_size)
        .enumerate()
        .map(|(chunk_id, group)| {
            let text = group
                .iter()
                .map(|(_, page)| *page)
                .collect::<Vec<_>>()
                .join("\n");
            let token_estimate = estimate_tokens(&text);
            let (first, _) = group.first().copied().unwrap();
            let (last, _) = group.last().copied().unwrap();
            Chunk {
                chunk_id,
                text,
                page_start: first,
                page_end: last + 1,
                token_estimate,
            }
        })
        .collect()
}

fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|text| text.to_string()).collect()
    }

    #[test]
    fn chunk_count_is_ceiling_of_page_count_over_block_size() {
        let pages = pages(&["a", "b", "c", "d", "e"]);
        for block_size in 1..=6 {
            let chunks = chunk_pages(&pages, &ChunkerConfig { block_size });
            assert_eq!(chunks.len(), pages.len().div_ceil(block_size));
        }
    }

    #[test]
    fn concatenated_chunks_reproduce_page_texts_in_order() {
        let pages = pages(&["one", "two", "three", "four", "five"]);
        let chunks = chunk_pages(&pages, &ChunkerConfig { block_size: 2 });
        let rebuilt = chunks
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(rebuilt, pages.join("\n"));
    }

    #[test]
    fn empty_pages_are_excluded_before_grouping() {
        let pages = pages(&["keep", "", "  ", "also keep", "tail"]);
        let chunks = chunk_pages(&pages, &ChunkerConfig { block_size: 2 });
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "keep\nalso keep");
        assert_eq!(chunks[1].text, "tail");
        assert!(chunks.iter().all(|chunk| !chunk.text.is_empty()));
    }

    #[test]
    fn chunk_ids_and_page_ranges_follow_document_order() {
        let pages = pages(&["a", "b", "c"]);
        let chunks = chunk_pages(&pages, &ChunkerConfig { block_size: 2 });
        assert_eq!(chunks[0].chunk_id, 0);
        assert_eq!((chunks[0].page_start, chunks[0].page_end), (0, 2));
        assert_eq!(chunks[1].chunk_id, 1);
        assert_eq!((chunks[1].page_start, chunks[1].page_end), (2, 3));
    }

    #[test]
    fn zero_usable_pages_yield_no_chunks() {
        let pages = pages(&["", "   "]);
        assert!(chunk_pages(&pages, &ChunkerConfig::default()).is_empty());
        assert!(chunk_pages(&[], &ChunkerConfig::default()).is_empty());
    }

    #[test]
    fn block_size_zero_is_treated_as_one() {
        let pages = pages(&["a", "b"]);
        let chunks = chunk_pages(&pages, &ChunkerConfig { block_size: 0 });
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn whole_document_block_size_is_the_degenerate_single_chunk() {
        let pages = pages(&["a", "b", "c"]);
        let chunks = chunk_pages(&pages, &ChunkerConfig { block_size: 10 });
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "a\nb\nc");
    }
}
