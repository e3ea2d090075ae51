//! High-level indexing engine that drives the full pipeline.
//!
//! One reload run walks the watched folder, diffs it against the
//! metadata store, and pushes every affected document through
//! extraction, segmentation, embedding, and persistence, ending with a
//! drift check between the vector index and the store:
//!
//! ```text
//! Discover → Diff → (per document: Extract → Segment → Embed → Persist)
//!          → DetectDrift → RebuildIfNeeded → Idle
//! ```
//!
//! Everything is sequential: one store connection, one vector index,
//! one document at a time, chunks in ordinal order. The drift check at
//! the end is what makes an interrupted run self-healing — whatever
//! state a crash leaves behind, the next run rebuilds the vector index
//! from the store before anyone searches it.
//!
//! Failure policy: a document that cannot be extracted is skipped and
//! reported; a chunk whose embedding call fails is skipped while its
//! siblings continue; store errors and dimension mismatches abort the
//! run, because continuing would desynchronize the index.

use anyhow::{Context, Result};
use satchel_embed::EmbeddingProvider;
use satchel_segment::estimate_tokens;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::chunking::{ChunkingConfig, ChunkingStrategy};
use super::document_index::{ChunkRecord, DocumentIndex, DocumentRecord};
use super::extract::{ExtractorRegistry, extension_of};
use super::vector_index::VectorIndex;

/// Configuration for the indexing engine
#[derive(Debug, Clone)]
pub struct IndexingEngineConfig {
    /// Folder whose documents are indexed
    pub documents_dir: PathBuf,
    /// Folder holding the SQLite database and the vector index files
    pub index_dir: PathBuf,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
}

impl IndexingEngineConfig {
    pub fn new(documents_dir: PathBuf, index_dir: PathBuf) -> Self {
        Self {
            documents_dir,
            index_dir,
            chunking: ChunkingConfig::default(),
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }
}

/// What one reload run did.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RunReport {
    pub documents_indexed: usize,
    pub documents_unchanged: usize,
    pub documents_removed: usize,
    pub documents_failed: usize,
    pub chunks_created: usize,
    pub embeddings_generated: usize,
    pub index_rebuilt: bool,
}

/// A file found on disk during discovery, already hashed.
#[derive(Debug, Clone)]
struct DiscoveredFile {
    path: String,
    name: String,
    doc_type: String,
    size_bytes: i64,
    modified_at: i64,
    hash: [u8; 32],
}

/// Owns the metadata store and the vector index and keeps them
/// consistent with the watched folder.
pub struct IndexingEngine {
    config: IndexingEngineConfig,
    document_index: DocumentIndex,
    vector_index: VectorIndex,
    registry: ExtractorRegistry,
    chunking: ChunkingStrategy,
}

impl IndexingEngine {
    /// Open the engine's stores inside `config.index_dir`.
    ///
    /// A persisted vector index is loaded if its file pair is intact; a
    /// corrupt pair is treated as an empty index and rebuilt from the
    /// metadata store immediately.
    pub async fn new(config: IndexingEngineConfig) -> Result<Self> {
        Self::with_registry(config, ExtractorRegistry::with_defaults()).await
    }

    /// Like [`new`](Self::new), with a caller-supplied extractor
    /// registry (extra formats, or fewer).
    pub async fn with_registry(
        config: IndexingEngineConfig,
        registry: ExtractorRegistry,
    ) -> Result<Self> {
        let document_index = DocumentIndex::open(&config.index_dir).await?;

        let vector_index = match VectorIndex::load(&config.index_dir).await {
            Ok(Some(index)) => index,
            Ok(None) => {
                debug!("No persisted vector index, starting empty");
                VectorIndex::new()
            }
            Err(e) => {
                warn!("Persisted vector index unusable ({e}); rebuilding from the metadata store");
                let mut index = VectorIndex::new();
                index.rebuild_from_source(document_index.all_embedded_chunks().await?)?;
                index.persist(&config.index_dir).await?;
                index
            }
        };

        let chunking = ChunkingStrategy::new(config.chunking.clone());

        Ok(Self {
            config,
            document_index,
            vector_index,
            registry,
            chunking,
        })
    }

    /// Run the full reload cycle against the watched folder.
    pub async fn reload_folder(&mut self, provider: &dyn EmbeddingProvider) -> Result<RunReport> {
        info!("Reloading folder {}", self.config.documents_dir.display());
        let mut report = RunReport::default();

        let discovered = self.discover().await?;
        let discovered_paths: HashSet<&str> =
            discovered.iter().map(|f| f.path.as_str()).collect();

        // Removed: documents with no corresponding file on disk. The
        // vector index is untouched here; the drift check settles it.
        let mut removal_occurred = false;
        for doc in self.document_index.list_documents().await? {
            if !discovered_paths.contains(doc.path.as_str()) {
                info!("Document no longer on disk, removing: {}", doc.name);
                if let Some(id) = doc.id {
                    self.document_index.delete_document(id).await?;
                }
                report.documents_removed += 1;
                removal_occurred = true;
            }
        }

        for file in discovered {
            match self.document_index.get_document_by_path(&file.path).await? {
                Some(existing) if existing.content_hash == file.hash => {
                    debug!("Unchanged, skipping: {}", file.name);
                    report.documents_unchanged += 1;
                    continue;
                }
                Some(existing) => {
                    info!("Content changed, reindexing: {}", file.name);
                    if let Some(id) = existing.id {
                        self.document_index.delete_document(id).await?;
                    }
                    removal_occurred = true;
                }
                None => debug!("New document: {}", file.name),
            }

            // Extraction failures skip the document; nothing was written
            // for it yet.
            let segments = match self.registry.extract(Path::new(&file.path)).await {
                Ok(segments) => segments,
                Err(e) => {
                    warn!("Skipping {}: {e}", file.name);
                    report.documents_failed += 1;
                    continue;
                }
            };

            let (chunks_created, embeddings_generated) =
                self.index_document(&file, &segments, provider).await?;
            report.documents_indexed += 1;
            report.chunks_created += chunks_created;
            report.embeddings_generated += embeddings_generated;
        }

        report.index_rebuilt = self.sync_vector_index(removal_occurred).await?;
        self.vector_index
            .persist(&self.config.index_dir)
            .await
            .context("persisting vector index")?;

        info!(
            "Reload complete: {} indexed, {} unchanged, {} removed, {} failed, {} chunks, {} embeddings{}",
            report.documents_indexed,
            report.documents_unchanged,
            report.documents_removed,
            report.documents_failed,
            report.chunks_created,
            report.embeddings_generated,
            if report.index_rebuilt {
                ", index rebuilt"
            } else {
                ""
            }
        );
        Ok(report)
    }

    /// Enumerate supported files under the watched folder and hash their
    /// contents. Creates the folder on first use.
    async fn discover(&self) -> Result<Vec<DiscoveredFile>> {
        let dir = &self.config.documents_dir;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await?;
            info!("Created documents folder {}", dir.display());
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in ignore::WalkBuilder::new(dir).build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {e}");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file()) || !self.registry.supports(path) {
                continue;
            }

            let content = match tokio::fs::read(path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Cannot read {}: {e}", path.display());
                    continue;
                }
            };
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Cannot stat {}: {e}", path.display());
                    continue;
                }
            };
            let modified_at = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or_default();

            let hash = *blake3::hash(&content).as_bytes();
            files.push(DiscoveredFile {
                path: path.to_string_lossy().to_string(),
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                doc_type: extension_of(path).unwrap_or_default(),
                size_bytes: content.len() as i64,
                modified_at,
                hash,
            });
        }

        // The walker's order depends on the filesystem; sort for a
        // deterministic discovery order.
        files.sort_by(|a, b| a.path.cmp(&b.path));
        debug!("Discovered {} supported files", files.len());
        Ok(files)
    }

    /// Segment, embed, and persist one document, then add its embedded
    /// chunks to the vector index as a single batch.
    async fn index_document(
        &mut self,
        file: &DiscoveredFile,
        segments: &[String],
        provider: &dyn EmbeddingProvider,
    ) -> Result<(usize, usize)> {
        let now = chrono::Utc::now().timestamp();
        let document = DocumentRecord {
            id: None,
            path: file.path.clone(),
            name: file.name.clone(),
            doc_type: file.doc_type.clone(),
            size_bytes: file.size_bytes,
            modified_at: file.modified_at,
            indexed_at: now,
            content_hash: file.hash,
        };
        let document_id = self
            .document_index
            .upsert_document(&document)
            .await
            .with_context(|| format!("storing document {}", file.name))?;
        self.document_index
            .save_raw_text(document_id, &segments.join("\n\n"))
            .await?;

        let chunk_texts = self.chunking.chunk_segments(segments);
        let model_id = provider.model_id();

        // Chunks are embedded and persisted in ordinal order; the vector
        // batch goes in only after every row for this document exists.
        let mut pending: Vec<(i64, Vec<half::f16>)> = Vec::new();
        let mut embeddings_generated = 0;
        for (ordinal, text) in chunk_texts.iter().enumerate() {
            let chunk = ChunkRecord {
                id: None,
                document_id,
                ordinal,
                text: text.clone(),
                token_estimate: estimate_tokens(text),
                embedding: None,
                embedding_model: None,
            };
            let chunk_id = self
                .document_index
                .save_chunk(&chunk)
                .await
                .with_context(|| format!("storing chunk {ordinal} of {}", file.name))?;

            match provider.embed_text(text).await {
                Ok(vector) => {
                    self.document_index
                        .set_embedding(chunk_id, &vector, &model_id)
                        .await?;
                    pending.push((chunk_id, vector));
                    embeddings_generated += 1;
                }
                Err(e) => {
                    warn!(
                        "Embedding failed for chunk {ordinal} of {}: {e}; continuing with remaining chunks",
                        file.name
                    );
                }
            }
        }

        if !pending.is_empty() {
            // A dimension mismatch here means the provider configuration
            // changed mid-run; surface it instead of guessing.
            self.vector_index
                .add_batch(&pending)
                .with_context(|| format!("adding vectors for {}", file.name))?;
        }

        debug!(
            "Indexed {}: {} chunks, {} embeddings",
            file.name,
            chunk_texts.len(),
            embeddings_generated
        );
        Ok((chunk_texts.len(), embeddings_generated))
    }

    /// Compare the vector index entry count with the store's embedded
    /// chunk count and rebuild when they diverge (or when `force` is
    /// set, e.g. after a removal). Returns whether a rebuild happened.
    async fn sync_vector_index(&mut self, force: bool) -> Result<bool> {
        let vector_count = self.vector_index.stats().vector_count;
        let embedded_count = self.document_index.count_chunks_with_embedding().await?;

        if !force && vector_count == embedded_count {
            debug!("Vector index in sync ({vector_count} vectors)");
            return Ok(false);
        }

        warn!(
            "Vector index drift: {vector_count} vectors vs {embedded_count} embedded chunks; rebuilding"
        );
        let pairs = self.document_index.all_embedded_chunks().await?;
        self.vector_index.rebuild_from_source(pairs)?;
        Ok(true)
    }

    /// Force a full rebuild of the vector index from the metadata store
    /// and persist it. Returns the rebuilt vector count.
    pub async fn rebuild_index(&mut self) -> Result<usize> {
        let pairs = self.document_index.all_embedded_chunks().await?;
        self.vector_index.rebuild_from_source(pairs)?;
        self.vector_index.persist(&self.config.index_dir).await?;
        Ok(self.vector_index.stats().vector_count)
    }

    /// File extensions the engine will pick up during discovery.
    pub fn supported_extensions(&self) -> Vec<&str> {
        self.registry.supported_extensions()
    }

    pub fn document_index(&self) -> &DocumentIndex {
        &self.document_index
    }

    pub fn vector_index(&self) -> &VectorIndex {
        &self.vector_index
    }

    pub fn config(&self) -> &IndexingEngineConfig {
        &self.config
    }
}
