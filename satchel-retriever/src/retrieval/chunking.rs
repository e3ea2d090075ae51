//! Chunking configuration - delegates the splitting itself to satchel-segment

use satchel_segment::TextSegmenter;
use serde::{Deserialize, Serialize};

/// Configuration for chunking extracted text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum size of each chunk in bytes
    pub max_chunk_size: usize,
    /// Bytes shared between consecutive windows of an oversized paragraph
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl ChunkingConfig {
    pub fn with_max_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size;
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }
}

/// Turns extracted raw segments into chunk texts.
#[derive(Debug, Clone)]
pub struct ChunkingStrategy {
    config: ChunkingConfig,
}

impl ChunkingStrategy {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Join the extractor's raw segments (pages, sections) into one text
    /// and split it into bounded chunks. Chunk ordinal = output index.
    pub fn chunk_segments(&self, segments: &[String]) -> Vec<String> {
        let text = segments.join("\n\n");
        let segmenter = TextSegmenter::new(self.config.max_chunk_size, self.config.overlap);
        let chunks = segmenter.segment(&text);

        tracing::debug!(
            "Segmented {} raw segments into {} chunks (max size {})",
            segments.len(),
            chunks.len(),
            self.config.max_chunk_size
        );

        chunks
    }
}
