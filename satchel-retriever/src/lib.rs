//! satchel-retriever: document indexing and retrieval for
//! retrieval-augmented question answering over a local folder.
//!
//! The crate keeps three things mutually consistent on one machine:
//! the files in a watched folder, a relational record of what has been
//! embedded (SQLite via `sqlx`), and a vector similarity index over the
//! chunk embeddings. Content hashes decide what gets (re)indexed; a
//! count comparison between the vector index and the store decides when
//! the index must be rebuilt.
//!
//! ## Key Modules
//!
//! - **[`retrieval::document_index`]**: documents, chunks, and raw text
//!   in SQLite
//! - **[`retrieval::vector_index`]**: flat L2 index with a persisted
//!   chunk-id ↔ slot mapping
//! - **[`retrieval::indexing_engine`]**: the reload pipeline
//!   (discover, diff, extract, segment, embed, persist, drift check)
//! - **[`retrieval::search`]**: nearest-neighbor retrieval joined back
//!   to stored chunks
//! - **[`retrieval::extract`]**: the extension → extractor registry
//! - **[`config`]**: explicit TOML-backed configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use satchel_retriever::retrieval::indexing_engine::{
//!     IndexingEngine, IndexingEngineConfig,
//! };
//! use satchel_embed::{EmbedConfig, OpenAiProvider};
//! use std::path::PathBuf;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = IndexingEngineConfig::new(
//!     PathBuf::from("documents"),
//!     PathBuf::from(".satchel"),
//! );
//! let provider = OpenAiProvider::new(EmbedConfig::default())?;
//! let mut engine = IndexingEngine::new(config).await?;
//! let report = engine.reload_folder(&provider).await?;
//! println!("{} documents indexed", report.documents_indexed);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod retrieval;
