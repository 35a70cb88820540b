//! Retrieval layer
//!
//! Features:
//! - Embedding client with preprocessing, validation and TTL caching
//! - Qdrant vector store client with filter expressions and payload indices
//! - Dense search, sparse scoring over scrolled candidates, RRF fusion
//! - Context processing: rerank, MMR diversity, token-budget compression,
//!   citation formatting

pub mod context;
pub mod embeddings;
pub mod search;
pub mod vector_store;

pub use context::{ContextProcessor, ProcessedContext};
pub use embeddings::{preprocess_text, EmbeddingClient, EmbeddingConfig};
pub use search::Searcher;
pub use vector_store::{
    CollectionInfo, FilterValue, SearchFilter, VectorHit, VectorStore, VectorStoreConfig,
};

use thiserror::Error;

/// Retrieval errors
#[derive(Error, Debug)]
pub enum RagError {
    /// Embedding output failed validation
    #[error("Invalid embedding: {0}")]
    EmbeddingInvalid(String),

    /// Embedding backend failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<RagError> for task_agent_core::Error {
    fn from(err: RagError) -> Self {
        match err {
            RagError::EmbeddingInvalid(msg) => task_agent_core::Error::EmbeddingInvalid(msg),
            other => task_agent_core::Error::Upstream(other.to_string()),
        }
    }
}
