//! End-to-end tests for the reload cycle: discovery, hashing, diffing,
//! chunking, embedding, and vector index synchronization.
//!
//! A deterministic stub provider stands in for the embedding API so the
//! tests can assert on exact counts, call volumes, and ranking.

use anyhow::Result;
use async_trait::async_trait;
use half::f16;
use satchel_embed::provider::{EmbeddingProvider, EmbeddingResult};
use satchel_embed::{EmbedError, Result as EmbedResult};
use satchel_retriever::retrieval::chunking::ChunkingConfig;
use satchel_retriever::retrieval::indexing_engine::{IndexingEngine, IndexingEngineConfig};
use satchel_retriever::retrieval::search::RetrievalEngine;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;

/// Deterministic embedding provider: a normalized byte histogram of the
/// text. Identical text always embeds to the identical vector.
struct StubProvider {
    dimension: usize,
    calls: AtomicUsize,
    /// Texts containing this marker fail to embed
    poison: Option<&'static str>,
}

impl StubProvider {
    fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
            poison: None,
        }
    }

    fn with_poison(dimension: usize, marker: &'static str) -> Self {
        Self {
            poison: Some(marker),
            ..Self::new(dimension)
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn stub_vector(text: &str, dimension: usize) -> Vec<f16> {
    let mut buckets = vec![0f32; dimension];
    for (i, byte) in text.bytes().enumerate() {
        buckets[(byte as usize + i) % dimension] += 1.0;
    }
    let norm = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut buckets {
            *value /= norm;
        }
    }
    buckets.into_iter().map(f16::from_f32).collect()
}

#[async_trait]
impl EmbeddingProvider for StubProvider {
    async fn embed_text(&self, text: &str) -> EmbedResult<Vec<f16>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = self.poison {
            if text.contains(marker) {
                return Err(EmbedError::Api {
                    status: 500,
                    body: "stub poisoned".to_string(),
                });
            }
        }
        Ok(stub_vector(text, self.dimension))
    }

    async fn embed_texts(&self, texts: &[String]) -> EmbedResult<EmbeddingResult> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_text(text).await?);
        }
        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> String {
        format!("stub:{}", self.dimension)
    }
}

fn engine_config(root: &Path) -> IndexingEngineConfig {
    IndexingEngineConfig::new(root.join("documents"), root.join("index"))
        .with_chunking(ChunkingConfig::default())
}

/// The central consistency contract: after any completed run the vector
/// index holds exactly one entry per embedded chunk.
async fn assert_consistent(engine: &IndexingEngine) -> Result<()> {
    let vector_count = engine.vector_index().stats().vector_count;
    let embedded = engine.document_index().count_chunks_with_embedding().await?;
    assert_eq!(vector_count, embedded, "vector index drifted from the store");
    Ok(())
}

#[tokio::test]
async fn empty_folder_reload_is_a_no_op() -> Result<()> {
    let root = tempdir()?;
    let provider = StubProvider::new(8);
    let mut engine = IndexingEngine::new(engine_config(root.path())).await?;

    let report = engine.reload_folder(&provider).await?;

    assert_eq!(report.documents_indexed, 0);
    assert_eq!(report.chunks_created, 0);
    assert_eq!(provider.call_count(), 0);
    let stats = engine.vector_index().stats();
    assert_eq!(stats.vector_count, 0);
    assert!(!stats.initialized);
    // The watched folder is created on first use.
    assert!(root.path().join("documents").is_dir());
    Ok(())
}

#[tokio::test]
async fn small_file_becomes_one_chunk_and_one_vector() -> Result<()> {
    let root = tempdir()?;
    let docs = root.path().join("documents");
    tokio::fs::create_dir_all(&docs).await?;
    tokio::fs::write(docs.join("note.txt"), "a".repeat(50)).await?;

    let provider = StubProvider::new(8);
    let mut engine = IndexingEngine::new(engine_config(root.path())).await?;
    let report = engine.reload_folder(&provider).await?;

    assert_eq!(report.documents_indexed, 1);
    assert_eq!(report.chunks_created, 1);
    assert_eq!(report.embeddings_generated, 1);
    assert_eq!(engine.vector_index().stats().vector_count, 1);
    assert_consistent(&engine).await?;
    Ok(())
}

#[tokio::test]
async fn long_single_paragraph_is_windowed_with_overlap() -> Result<()> {
    let root = tempdir()?;
    let docs = root.path().join("documents");
    tokio::fs::create_dir_all(&docs).await?;
    tokio::fs::write(docs.join("long.txt"), "x".repeat(2500)).await?;

    let provider = StubProvider::new(8);
    let mut engine = IndexingEngine::new(engine_config(root.path())).await?;
    let report = engine.reload_folder(&provider).await?;

    // Windows at offsets 0, 800, 1600: two full chunks and a 900-byte tail.
    assert_eq!(report.chunks_created, 3);

    let documents = engine.document_index().list_documents().await?;
    let chunks = engine
        .document_index()
        .list_chunks_for_document(documents[0].id.unwrap())
        .await?;
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].text.len(), 1000);
    assert_eq!(chunks[1].text.len(), 1000);
    assert_eq!(chunks[2].text.len(), 900);
    assert_eq!(chunks[0].text[800..], chunks[1].text[..200]);
    let ordinals: Vec<usize> = chunks.iter().map(|c| c.ordinal).collect();
    assert_eq!(ordinals, vec![0, 1, 2]);

    assert_consistent(&engine).await?;
    Ok(())
}

#[tokio::test]
async fn unchanged_folder_reload_is_idempotent() -> Result<()> {
    let root = tempdir()?;
    let docs = root.path().join("documents");
    tokio::fs::create_dir_all(&docs).await?;
    tokio::fs::write(docs.join("a.txt"), "alpha document body").await?;
    tokio::fs::write(docs.join("b.txt"), "beta document body").await?;

    let provider = StubProvider::new(8);
    let mut engine = IndexingEngine::new(engine_config(root.path())).await?;
    engine.reload_folder(&provider).await?;
    let calls_after_first = provider.call_count();
    let vectors_after_first = engine.vector_index().stats().vector_count;

    let report = engine.reload_folder(&provider).await?;

    assert_eq!(report.documents_indexed, 0);
    assert_eq!(report.documents_unchanged, 2);
    // The unchanged hash short-circuits before any provider call.
    assert_eq!(provider.call_count(), calls_after_first);
    assert_eq!(engine.vector_index().stats().vector_count, vectors_after_first);
    assert_eq!(engine.document_index().count_documents().await?, 2);
    assert_consistent(&engine).await?;
    Ok(())
}

#[tokio::test]
async fn edited_file_replaces_its_document_and_rebuilds() -> Result<()> {
    let root = tempdir()?;
    let docs = root.path().join("documents");
    tokio::fs::create_dir_all(&docs).await?;
    let file = docs.join("draft.txt");
    tokio::fs::write(&file, "original wording of the draft").await?;

    let provider = StubProvider::new(8);
    let mut engine = IndexingEngine::new(engine_config(root.path())).await?;
    engine.reload_folder(&provider).await?;
    let original = engine.document_index().get_document_by_path(
        file.to_string_lossy().as_ref(),
    )
    .await?
    .expect("document was indexed");

    tokio::fs::write(&file, "completely rewritten draft, now with much more to say").await?;
    let report = engine.reload_folder(&provider).await?;

    assert_eq!(report.documents_indexed, 1);
    assert!(report.index_rebuilt, "hash change must force a rebuild");

    let replacement = engine
        .document_index()
        .get_document_by_path(file.to_string_lossy().as_ref())
        .await?
        .expect("replacement document exists");
    assert_ne!(replacement.content_hash, original.content_hash);
    assert_eq!(engine.document_index().count_documents().await?, 1);
    assert_consistent(&engine).await?;
    Ok(())
}

#[tokio::test]
async fn removed_file_disappears_from_store_and_index() -> Result<()> {
    let root = tempdir()?;
    let docs = root.path().join("documents");
    tokio::fs::create_dir_all(&docs).await?;
    tokio::fs::write(docs.join("keep.txt"), "the keeper document").await?;
    let doomed = docs.join("doomed.txt");
    tokio::fs::write(&doomed, "text that is going away").await?;

    let provider = StubProvider::new(8);
    let mut engine = IndexingEngine::new(engine_config(root.path())).await?;
    engine.reload_folder(&provider).await?;
    assert_eq!(engine.document_index().count_documents().await?, 2);

    let doomed_doc = engine
        .document_index()
        .get_document_by_path(doomed.to_string_lossy().as_ref())
        .await?
        .expect("doomed document indexed");
    let doomed_chunk_ids: Vec<i64> = engine
        .document_index()
        .list_chunks_for_document(doomed_doc.id.unwrap())
        .await?
        .iter()
        .filter_map(|c| c.id)
        .collect();
    assert!(!doomed_chunk_ids.is_empty());

    tokio::fs::remove_file(&doomed).await?;
    let report = engine.reload_folder(&provider).await?;

    assert_eq!(report.documents_removed, 1);
    assert!(report.index_rebuilt, "removal must force a rebuild");
    assert_eq!(engine.document_index().count_documents().await?, 1);
    for id in &doomed_chunk_ids {
        assert!(
            !engine.vector_index().contains(*id),
            "removed chunk {id} still present in the vector index"
        );
    }
    // No query can return the removed chunks any more.
    let retrieval = RetrievalEngine::new(engine.vector_index(), engine.document_index());
    let query = stub_vector("text that is going away", 8);
    let results = retrieval.retrieve(&query, 10, f32::MAX).await?;
    assert!(results
        .iter()
        .all(|scored| !doomed_chunk_ids.contains(&scored.chunk.id.unwrap())));

    assert_consistent(&engine).await?;
    Ok(())
}

#[tokio::test]
async fn verbatim_text_ranks_first_with_the_smallest_distance() -> Result<()> {
    let root = tempdir()?;
    let docs = root.path().join("documents");
    tokio::fs::create_dir_all(&docs).await?;
    let needle = "the quick brown fox jumps over the lazy dog";
    tokio::fs::write(docs.join("needle.txt"), needle).await?;
    tokio::fs::write(docs.join("other1.txt"), "entirely unrelated grocery list").await?;
    tokio::fs::write(docs.join("other2.txt"), "meeting notes from last tuesday").await?;

    let provider = StubProvider::new(8);
    let mut engine = IndexingEngine::new(engine_config(root.path())).await?;
    engine.reload_folder(&provider).await?;

    let retrieval = RetrievalEngine::new(engine.vector_index(), engine.document_index());
    let results = retrieval.retrieve(&stub_vector(needle, 8), 3, f32::MAX).await?;

    assert!(!results.is_empty());
    assert_eq!(results[0].document.name, "needle.txt");
    assert!(results[0].distance.abs() < 1e-3);
    for pair in results.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
    Ok(())
}

#[tokio::test]
async fn threshold_filters_dissimilar_results() -> Result<()> {
    let root = tempdir()?;
    let docs = root.path().join("documents");
    tokio::fs::create_dir_all(&docs).await?;
    tokio::fs::write(docs.join("only.txt"), "aaaaaaaaaaaaaaaa").await?;

    let provider = StubProvider::new(8);
    let mut engine = IndexingEngine::new(engine_config(root.path())).await?;
    engine.reload_folder(&provider).await?;

    let retrieval = RetrievalEngine::new(engine.vector_index(), engine.document_index());
    // A maximally different query under a tight threshold: no context.
    let results = retrieval
        .retrieve(&stub_vector("zzzz 9999 ~~~~", 8), 5, 1e-6)
        .await?;
    assert!(results.is_empty(), "threshold should drop dissimilar chunks");
    Ok(())
}

#[tokio::test]
async fn embedding_failure_skips_the_chunk_but_not_the_document() -> Result<()> {
    let root = tempdir()?;
    let docs = root.path().join("documents");
    tokio::fs::create_dir_all(&docs).await?;
    // Two paragraphs large enough to land in separate chunks; the first
    // carries the poison marker.
    let bad = format!("POISON {}", "b".repeat(900));
    let good = "g".repeat(900);
    tokio::fs::write(docs.join("mixed.txt"), format!("{bad}\n{good}")).await?;

    let provider = StubProvider::with_poison(8, "POISON");
    let mut engine = IndexingEngine::new(engine_config(root.path())).await?;
    let report = engine.reload_folder(&provider).await?;

    assert_eq!(report.documents_indexed, 1);
    assert_eq!(report.chunks_created, 2);
    assert_eq!(report.embeddings_generated, 1);
    // The failed chunk is stored without an embedding and is not indexed.
    assert_eq!(engine.document_index().count_chunks().await?, 2);
    assert_eq!(engine.document_index().count_chunks_with_embedding().await?, 1);
    assert_consistent(&engine).await?;
    Ok(())
}

#[tokio::test]
async fn unsupported_files_are_ignored_by_discovery() -> Result<()> {
    let root = tempdir()?;
    let docs = root.path().join("documents");
    tokio::fs::create_dir_all(&docs).await?;
    tokio::fs::write(docs.join("good.txt"), "supported content").await?;
    tokio::fs::write(docs.join("image.png"), [0u8, 1, 2, 3]).await?;
    tokio::fs::write(docs.join("scan.pdf"), b"%PDF-1.4 not really").await?;

    let provider = StubProvider::new(8);
    let mut engine = IndexingEngine::new(engine_config(root.path())).await?;
    let report = engine.reload_folder(&provider).await?;

    assert_eq!(report.documents_indexed, 1);
    assert_eq!(engine.document_index().count_documents().await?, 1);
    Ok(())
}

#[tokio::test]
async fn corrupt_index_pair_recovers_by_rebuilding() -> Result<()> {
    let root = tempdir()?;
    let docs = root.path().join("documents");
    tokio::fs::create_dir_all(&docs).await?;
    tokio::fs::write(docs.join("a.txt"), "first document").await?;
    tokio::fs::write(docs.join("b.txt"), "second document").await?;

    let provider = StubProvider::new(8);
    {
        let mut engine = IndexingEngine::new(engine_config(root.path())).await?;
        engine.reload_folder(&provider).await?;
        assert_eq!(engine.vector_index().stats().vector_count, 2);
    }

    // Break the pair: keep the vectors, drop the mapping sidecar.
    tokio::fs::remove_file(root.path().join("index").join("id_mapping.json")).await?;

    let engine = IndexingEngine::new(engine_config(root.path())).await?;
    assert_eq!(engine.vector_index().stats().vector_count, 2);
    assert_consistent(&engine).await?;

    let retrieval = RetrievalEngine::new(engine.vector_index(), engine.document_index());
    let results = retrieval
        .retrieve(&stub_vector("first document", 8), 2, f32::MAX)
        .await?;
    assert_eq!(results[0].document.name, "a.txt");
    Ok(())
}

#[tokio::test]
async fn persisted_index_survives_a_restart() -> Result<()> {
    let root = tempdir()?;
    let docs = root.path().join("documents");
    tokio::fs::create_dir_all(&docs).await?;
    tokio::fs::write(docs.join("stable.txt"), "content that persists").await?;

    let provider = StubProvider::new(8);
    {
        let mut engine = IndexingEngine::new(engine_config(root.path())).await?;
        engine.reload_folder(&provider).await?;
    }

    // A fresh engine picks up the persisted pair without reindexing.
    let engine = IndexingEngine::new(engine_config(root.path())).await?;
    let stats = engine.vector_index().stats();
    assert_eq!(stats.vector_count, 1);
    assert_eq!(stats.dimension, 8);
    assert!(stats.initialized);
    assert_consistent(&engine).await?;
    Ok(())
}

#[tokio::test]
async fn changing_the_embedding_dimension_fails_the_run() -> Result<()> {
    let root = tempdir()?;
    let docs = root.path().join("documents");
    tokio::fs::create_dir_all(&docs).await?;
    tokio::fs::write(docs.join("first.txt"), "indexed at dimension eight").await?;

    let mut engine = IndexingEngine::new(engine_config(root.path())).await?;
    engine.reload_folder(&StubProvider::new(8)).await?;

    // A provider that suddenly produces four-dimensional vectors is a
    // configuration error, not something to paper over.
    tokio::fs::write(docs.join("second.txt"), "indexed at dimension four").await?;
    let result = engine.reload_folder(&StubProvider::new(4)).await;
    assert!(result.is_err());
    Ok(())
}
