//! satchel-segment: pure text segmentation for the satchel document
//! retrieval system.
//!
//! The crate has no I/O and no knowledge of documents, databases, or
//! embeddings; it only decides where chunk boundaries fall. See
//! [`TextSegmenter`] for the splitting rules.

pub mod text;

pub use text::{TextSegmenter, estimate_tokens};
