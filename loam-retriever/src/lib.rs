//! loam-retriever: incremental indexing and hybrid retrieval for note corpora
//!
//! This crate is the engine behind loam: it keeps a content-addressed SQLite
//! index of a folder of notes in sync with the filesystem, and answers
//! queries by fusing exhaustive vector scoring with lexical full-text search.
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: the [`Indexer`](retrieval::Indexer) (walk → diff →
//!   embed → commit) and the [`Retriever`](retrieval::Retriever) (vector +
//!   lexical fusion, per-document cap, MMR, optional re-ranker)
//! - **[`storage`]**: the narrow [`Store`](storage::Store) contract and its
//!   SQLite implementation
//!
//! ## Architecture
//!
//! ```text
//! Corpus walk → Chunker → diff by chunk id → Embedder → SQLite Storage
//!                (loam-chunk)                (loam-embed)     ↓
//!                                Retriever ← fusion/MMR ← Search reads
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use loam_chunk::Chunker;
//! use loam_embed::{Embedder, EmbeddingProvider, RetryPolicy};
//! use loam_retriever::retrieval::{CancelToken, Indexer, IndexerConfig};
//! use loam_retriever::storage::sqlite_store::SqliteStore;
//!
//! # async fn example(provider: Arc<dyn EmbeddingProvider>) -> anyhow::Result<()> {
//! let store = Arc::new(SqliteStore::open(&PathBuf::from(".loam.db")).await?);
//! let embedder = Embedder::new(provider, RetryPolicy::default(), 16);
//! let indexer = Indexer::new(
//!     store.clone(),
//!     Chunker::default(),
//!     embedder,
//!     IndexerConfig::new(PathBuf::from("./notes")),
//! );
//! let report = indexer.run(&CancelToken::new()).await?;
//! println!("indexed {} documents", report.documents_processed);
//! # Ok(())
//! # }
//! ```

pub mod retrieval;
pub mod storage;

pub use retrieval::{
    CancelToken, IndexReport, Indexer, IndexerConfig, Reranker, RetrievalConfig, Retriever,
    ScoredChunk,
};
pub use storage::{ChunkFilter, ChunkRecord, DocumentState, LexicalHit, Store};
