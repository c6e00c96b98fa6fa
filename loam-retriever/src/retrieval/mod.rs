//! Indexing and retrieval pipelines.

pub mod indexer;
pub mod retriever;

pub use indexer::{CancelToken, IndexReport, Indexer, IndexerConfig};
pub use retriever::{Reranker, RetrievalConfig, Retriever, ScoredChunk};
