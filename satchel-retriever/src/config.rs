//! Application configuration.
//!
//! One explicit [`SatchelConfig`] value, loaded from a TOML file, is
//! passed into every component that needs it — there is no process-wide
//! configuration state. A missing file means defaults; the API key is
//! always taken from the environment, never from the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::retrieval::chunking::ChunkingConfig;
use crate::retrieval::indexing_engine::IndexingEngineConfig;
use crate::retrieval::search::{DEFAULT_MAX_DISTANCE, DEFAULT_TOP_K};
use satchel_embed::EmbedConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Neighbors requested per query
    pub top_k: usize,
    /// Squared-L2 ceiling; results farther than this are dropped
    pub max_distance: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_distance: DEFAULT_MAX_DISTANCE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SatchelConfig {
    /// Folder whose documents are indexed
    pub documents_dir: PathBuf,
    /// Folder holding the database and vector index files
    pub index_dir: PathBuf,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbedConfig,
}

impl Default for SatchelConfig {
    fn default() -> Self {
        Self {
            documents_dir: PathBuf::from("documents"),
            index_dir: PathBuf::from(".satchel"),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbedConfig::default(),
        }
    }
}

impl SatchelConfig {
    /// Load configuration from a TOML file; a missing file yields the
    /// defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    /// The engine-facing slice of this configuration.
    pub fn engine_config(&self) -> IndexingEngineConfig {
        IndexingEngineConfig::new(self.documents_dir.clone(), self.index_dir.clone())
            .with_chunking(self.chunking.clone())
    }
}
