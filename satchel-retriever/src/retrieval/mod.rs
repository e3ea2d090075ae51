//! Core retrieval modules: persistence, the vector index, extraction,
//! chunking, the indexing engine, and search.

pub mod chunking;
pub mod document_index;
pub mod extract;
pub mod indexing_engine;
pub mod search;
pub mod vector_index;
