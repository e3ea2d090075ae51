//! satchel-embed: the embedding and completion provider boundary for the
//! satchel document retrieval system.
//!
//! The crate exposes two traits — [`EmbeddingProvider`] ("given text,
//! return a fixed-length vector") and [`TextGenerator`] ("given a prompt
//! and context, return generated text") — plus an OpenAI-compatible HTTP
//! implementation. Provider failures are always surfaced as
//! [`EmbedError`]; they are never defaulted to a zero vector.

pub mod config;
pub mod error;
pub mod provider;

pub use config::EmbedConfig;
pub use error::{EmbedError, Result};
pub use provider::{EmbeddingProvider, EmbeddingResult, OpenAiProvider, TextGenerator};
