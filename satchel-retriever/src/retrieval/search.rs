//! Retrieval: nearest-neighbor search joined back to stored chunks.

use anyhow::Result;
use half::f16;
use itertools::Itertools;
use tracing::{debug, warn};

use super::document_index::{ChunkRecord, DocumentIndex, DocumentRecord};
use super::vector_index::{IndexError, VectorIndex};

/// Default number of neighbors to retrieve.
pub const DEFAULT_TOP_K: usize = 5;

/// Default distance ceiling. Distances are squared L2; anything above
/// this is too dissimilar to be useful context.
pub const DEFAULT_MAX_DISTANCE: f32 = 1.2;

/// A retrieved chunk with its parent document and distance score
/// (smaller is more similar).
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: ChunkRecord,
    pub document: DocumentRecord,
    pub distance: f32,
}

/// Answers nearest-neighbor queries against the vector index and joins
/// the hits back through the metadata store.
///
/// Borrows both stores: the index and the store have exactly one owner
/// (the indexing engine), and retrieval reads whatever state they are
/// in between runs.
pub struct RetrievalEngine<'a> {
    index: &'a VectorIndex,
    store: &'a DocumentIndex,
}

impl<'a> RetrievalEngine<'a> {
    pub fn new(index: &'a VectorIndex, store: &'a DocumentIndex) -> Self {
        Self { index, store }
    }

    /// The `k` nearest chunks to `query` within `max_distance`, in
    /// ascending distance order.
    ///
    /// An empty result is a normal outcome — an empty index, or no
    /// candidate under the threshold, both mean "no relevant context",
    /// not an error. Hits whose chunk or document row has disappeared
    /// are skipped rather than surfaced.
    pub async fn retrieve(
        &self,
        query: &[f16],
        k: usize,
        max_distance: f32,
    ) -> Result<Vec<ScoredChunk>> {
        let hits = match self.index.search(query, k) {
            Ok(hits) => hits,
            Err(IndexError::EmptyIndex) => {
                debug!("Vector index is empty, nothing to retrieve");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut results = Vec::with_capacity(hits.len());
        for (key, distance) in hits {
            if distance > max_distance {
                continue;
            }
            let Some(chunk) = self.store.get_chunk_by_id(key).await? else {
                warn!("Vector index references missing chunk {key}, skipping");
                continue;
            };
            let Some(document) = self.store.get_document_by_id(chunk.document_id).await? else {
                warn!(
                    "Chunk {key} references missing document {}, skipping",
                    chunk.document_id
                );
                continue;
            };
            results.push(ScoredChunk {
                chunk,
                document,
                distance,
            });
        }

        debug!("Retrieved {} chunks within distance {max_distance}", results.len());
        Ok(results)
    }
}

/// Format retrieved chunks into the context block handed to the text
/// generator, with source attribution per chunk. Empty input formats to
/// an empty string.
pub fn format_context(results: &[ScoredChunk]) -> String {
    if results.is_empty() {
        return String::new();
    }
    let body = results
        .iter()
        .map(|scored| format!("[Source: {}]\n{}", scored.document.name, scored.chunk.text))
        .join("\n\n");
    format!("Relevant context:\n\n{body}")
}
