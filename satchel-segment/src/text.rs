//! Text segmentation for retrieval pipelines.
//!
//! This module turns raw extracted document text into bounded, ordered
//! chunks suitable for embedding. Splitting is paragraph-first: the
//! segmenter packs whole paragraphs into chunks up to a size limit, and
//! slices paragraphs that are themselves too large into fixed-size
//! windows that share a configurable overlap with their neighbor.
//!
//! The segmenter is a pure function over the input text: no I/O, no
//! shared state. The index of a chunk in the returned sequence is its
//! ordinal within the document.
//!
//! # Example
//!
//! ```
//! use satchel_segment::TextSegmenter;
//!
//! let segmenter = TextSegmenter::new(1000, 200);
//! let chunks = segmenter.segment("a short note");
//! assert_eq!(chunks, vec!["a short note".to_string()]);
//! ```

/// Splits raw text into bounded, overlapping chunks.
///
/// `max_size` bounds each chunk's length in bytes (snapped to UTF-8
/// character boundaries). `overlap` is the number of bytes consecutive
/// windows of an oversized paragraph share. The windowing loop always
/// advances by at least one character per step, so pathological
/// configurations such as `overlap >= max_size` still terminate.
#[derive(Debug, Clone)]
pub struct TextSegmenter {
    max_size: usize,
    overlap: usize,
}

impl TextSegmenter {
    /// Create a segmenter. A `max_size` of zero is treated as one, so a
    /// window can always hold at least one character.
    pub fn new(max_size: usize, overlap: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            overlap,
        }
    }

    /// Split `text` into ordered chunks.
    ///
    /// Text that fits within `max_size` is returned as a single chunk
    /// equal to the input. Otherwise the text is split on paragraph
    /// boundaries (newlines); paragraphs are packed greedily into chunks,
    /// and a paragraph longer than `max_size` is sliced into overlapping
    /// windows. No returned chunk is empty; empty input yields an empty
    /// sequence.
    pub fn segment(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        if text.len() <= self.max_size {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut current = String::new();

        for paragraph in text.split('\n') {
            if paragraph.len() > self.max_size {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                self.slice_windows(paragraph, &mut chunks);
            } else if current.len() + paragraph.len() + 1 > self.max_size {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                current.push_str(paragraph);
            } else {
                if !current.is_empty() {
                    current.push('\n');
                }
                current.push_str(paragraph);
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks.retain(|chunk| !chunk.is_empty());
        chunks
    }

    /// Slice a single oversized paragraph into windows of `max_size`
    /// bytes with `overlap` bytes shared between consecutive windows.
    ///
    /// Invariants: every step advances the window start by at least one
    /// character, the final window ends exactly at the paragraph end, and
    /// the loop is bounded by the paragraph length. If the bound is ever
    /// exceeded the remainder is emitted as one chunk.
    fn slice_windows(&self, paragraph: &str, out: &mut Vec<String>) {
        let len = paragraph.len();
        let mut start = 0;
        let mut steps = 0;
        // One-character minimum advance means at most `len` windows.
        let step_limit = len;

        while start < len {
            if steps >= step_limit {
                out.push(paragraph[start..].to_string());
                break;
            }
            steps += 1;

            let mut end = floor_char_boundary(paragraph, (start + self.max_size).min(len));
            if end <= start {
                // A single character wider than max_size still makes progress.
                end = ceil_char_boundary(paragraph, start + 1);
            }
            out.push(paragraph[start..end].to_string());

            if end == len {
                break;
            }

            let mut next = end.saturating_sub(self.overlap);
            if next <= start {
                next = start + 1;
            }
            start = ceil_char_boundary(paragraph, next);
        }
    }
}

/// Approximate token count for a chunk, used for budgeting context
/// windows. Whitespace-separated words are a close-enough proxy.
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index.min(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let segmenter = TextSegmenter::new(1000, 200);
        let text = "a".repeat(50);
        let chunks = segmenter.segment(&text);
        assert_eq!(chunks, vec![text]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let segmenter = TextSegmenter::new(1000, 200);
        assert!(segmenter.segment("").is_empty());
    }

    #[test]
    fn single_long_paragraph_windows_with_overlap() {
        let segmenter = TextSegmenter::new(1000, 200);
        let text = "x".repeat(2500);
        let chunks = segmenter.segment(&text);

        // Window starts at 0, 800, 1600: full windows except the last.
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(chunks[1].len(), 1000);
        assert_eq!(chunks[2].len(), 900);
    }

    #[test]
    fn consecutive_windows_share_the_overlap() {
        let segmenter = TextSegmenter::new(1000, 200);
        let text: String = (0..2500).map(|i| ((i % 26) as u8 + b'a') as char).collect();
        let chunks = segmenter.segment(&text);

        assert_eq!(chunks[0][800..], chunks[1][..200]);
        assert_eq!(chunks[1][800..], chunks[2][..200]);
    }

    #[test]
    fn overlap_at_least_max_size_still_terminates() {
        let segmenter = TextSegmenter::new(10, 10);
        let text = "y".repeat(100);
        let chunks = segmenter.segment(&text);

        assert!(!chunks.is_empty());
        // All of the input is covered even though the nominal step is zero.
        let covered: usize = chunks.iter().map(|c| c.len()).sum();
        assert!(covered >= text.len());
    }

    #[test]
    fn overlap_larger_than_max_size_terminates() {
        let segmenter = TextSegmenter::new(5, 50);
        let chunks = segmenter.segment(&"z".repeat(40));
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn paragraphs_pack_until_the_size_limit() {
        let segmenter = TextSegmenter::new(30, 5);
        let text = "first paragraph\nsecond one\nthird paragraph here\nfourth";
        let chunks = segmenter.segment(&text.to_string());

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 30));
        assert!(chunks.iter().all(|c| !c.is_empty()));
        // Paragraph order is preserved across chunks.
        let rejoined = chunks.join("\n");
        assert!(rejoined.contains("first paragraph"));
        assert!(rejoined.contains("fourth"));
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let segmenter = TextSegmenter::new(10, 3);
        let text = "àéîõü".repeat(20);
        let chunks = segmenter.segment(&text);

        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            // Slicing off a char boundary would have panicked already;
            // this re-checks the output is valid UTF-8 content.
            assert!(chunk.chars().count() > 0);
        }
    }

    #[test]
    fn token_estimate_counts_words() {
        assert_eq!(estimate_tokens("one two  three\nfour"), 4);
        assert_eq!(estimate_tokens(""), 0);
    }
}
