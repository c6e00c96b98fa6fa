//! Structure-aware chunking for note corpora.
//!
//! This crate turns a single document's text into an ordered list of stable,
//! deterministic chunk records: no I/O, no async, no global state. Documents
//! are scanned into typed blocks ([`blocks`]), assembled into chunks along
//! structural and size boundaries ([`chunker`]), and annotated with heading
//! paths, tags, wiki-link targets, content hashes and position-derived ids.
//!
//! The chunker is the pure front half of a retrieval pipeline: everything it
//! produces is derived only from `(path, text)`, which is what makes
//! content-addressed incremental indexing possible downstream.

pub mod blocks;
pub mod chunker;

pub use blocks::{Block, BlockKind, approx_token_count, scan_blocks};
pub use chunker::{
    ChunkKind, Chunker, ChunkerConfig, DEFAULT_GENERATED_BEGIN, DEFAULT_GENERATED_END, NoteChunk,
    chunk_id,
};
