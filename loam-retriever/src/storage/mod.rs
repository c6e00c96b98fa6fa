//! Storage abstraction for the loam retrieval engine.
//!
//! This module defines the narrow [`Store`] contract the indexer and
//! retriever are written against, plus the record types that cross it.
//! Keeping the contract small is what makes the write path auditable: every
//! mutation is one of three operations (`upsert_chunks`,
//! `delete_chunks_by_ids`, `delete_document`), each transactional per call,
//! so a reader never observes a document with half its chunks updated or a
//! lexical index disagreeing with the chunk table.
//!
//! ## Key Components
//!
//! - **Store**: async trait over document/chunk/lexical persistence
//! - **ChunkRecord**: a persisted chunk — chunker metadata plus document
//!   mtime and the (optional) f16 embedding
//! - **DocumentState**: the per-document aggregate the indexer diffs against
//! - **ChunkFilter**: one predicate shared by the vector and lexical paths
//!
//! ```text
//! Indexer ──┐
//!           ├── Store (trait) ── SqliteStore (one file: documents,
//! Retriever ┘                    chunks, chunks_fts)
//! ```

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use loam_chunk::{ChunkKind, NoteChunk};

pub mod sqlite_store;

/// A chunk as persisted: everything the chunker produced, the owning
/// document's modification time, and the embedding once it exists.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub path: String,
    pub heading_path: Vec<String>,
    pub ordinal: usize,
    pub kind: ChunkKind,
    pub content: String,
    pub representation: String,
    pub content_hash: String,
    pub tags: Vec<String>,
    pub links: Vec<String>,
    pub token_count: usize,
    /// Source document modification time (unix seconds), carried on every
    /// chunk so document aggregates and the recency boost need no join.
    pub mtime: i64,
    /// Unit-norm embedding stored as f16; `None` while embedding is pending.
    pub embedding: Option<Vec<half::f16>>,
}

impl ChunkRecord {
    /// Wrap a freshly chunked [`NoteChunk`] for persistence.
    pub fn from_note(note: NoteChunk, mtime: i64) -> Self {
        Self {
            id: note.id,
            path: note.path,
            heading_path: note.heading_path,
            ordinal: note.ordinal,
            kind: note.kind,
            content: note.content,
            representation: note.representation,
            content_hash: note.content_hash,
            tags: note.tags,
            links: note.links,
            token_count: note.token_count,
            mtime,
            embedding: None,
        }
    }
}

/// Per-document aggregate state used to decide whether re-chunking is
/// necessary at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentState {
    pub mtime: i64,
    pub chunk_count: usize,
    pub content_hash: String,
}

/// Optional predicate over chunks, applied identically by vector scoring and
/// lexical search so fused results never leak filtered-out chunks.
#[derive(Debug, Clone, Default)]
pub struct ChunkFilter {
    /// Keep only chunks whose document path starts with this prefix.
    pub path_prefix: Option<String>,
    /// Keep only chunks carrying at least one of these tags.
    pub tags: Option<Vec<String>>,
    /// Keep only chunks of these kinds.
    pub kinds: Option<Vec<ChunkKind>>,
}

impl ChunkFilter {
    pub fn is_empty(&self) -> bool {
        self.path_prefix.is_none() && self.tags.is_none() && self.kinds.is_none()
    }

    pub fn matches(&self, chunk: &ChunkRecord) -> bool {
        if let Some(prefix) = &self.path_prefix {
            if !chunk.path.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(tags) = &self.tags {
            if !tags.iter().any(|t| chunk.tags.contains(t)) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&chunk.kind) {
                return false;
            }
        }
        true
    }
}

/// A lexical-search candidate: the chunk plus a comparable positive score.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub chunk: ChunkRecord,
    pub score: f32,
}

/// Durable persistence for documents, chunks, vectors and the lexical index.
///
/// Implementations must keep each mutating call transactional: after a crash
/// the chunk table, the lexical index and the document aggregates agree on
/// which chunks exist. Lexical search is best-effort — queries that cannot
/// be parsed return an empty candidate list rather than an error.
#[async_trait]
pub trait Store: Send + Sync {
    /// Aggregate state for every tracked document, keyed by path.
    async fn load_document_states(&self) -> Result<HashMap<String, DocumentState>>;

    /// Full chunk+vector snapshot of one document, keyed by chunk id.
    async fn load_document_chunks(&self, path: &str) -> Result<HashMap<String, ChunkRecord>>;

    /// Insert or replace chunks by id, refresh their lexical entries, and
    /// recompute the owning documents' aggregate state — one transaction.
    async fn upsert_chunks(&self, chunks: &[ChunkRecord]) -> Result<()>;

    /// Remove chunks and their lexical entries; returns the removed count.
    async fn delete_chunks_by_ids(&self, ids: &[String]) -> Result<usize>;

    /// Cascading delete of a document and all its chunks; returns the number
    /// of chunks removed.
    async fn delete_document(&self, path: &str) -> Result<usize>;

    /// Full corpus scan, used by exhaustive vector scoring.
    async fn list_all_chunks(&self) -> Result<Vec<ChunkRecord>>;

    /// Ranked lexical candidates for a free-text query. Never fails on
    /// malformed query syntax.
    async fn lexical_search(
        &self,
        query: &str,
        limit: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<LexicalHit>>;

    /// Paths of all tracked documents.
    async fn list_indexed_paths(&self) -> Result<Vec<String>>;

    /// Flush and release the underlying storage.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk(path: &str, kind: ChunkKind, tags: &[&str]) -> ChunkRecord {
        ChunkRecord {
            id: format!("{path}-0"),
            path: path.to_string(),
            heading_path: vec![],
            ordinal: 0,
            kind,
            content: "content".to_string(),
            representation: "content".to_string(),
            content_hash: "hash".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            links: vec![],
            token_count: 2,
            mtime: 0,
            embedding: None,
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = ChunkFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&sample_chunk("notes/a.md", ChunkKind::Text, &[])));
    }

    #[test]
    fn test_path_prefix_filter() {
        let filter = ChunkFilter {
            path_prefix: Some("notes/".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&sample_chunk("notes/a.md", ChunkKind::Text, &[])));
        assert!(!filter.matches(&sample_chunk("journal/b.md", ChunkKind::Text, &[])));
    }

    #[test]
    fn test_tag_filter_matches_any() {
        let filter = ChunkFilter {
            tags: Some(vec!["rust".to_string(), "search".to_string()]),
            ..Default::default()
        };
        assert!(filter.matches(&sample_chunk("a.md", ChunkKind::Text, &["rust"])));
        assert!(!filter.matches(&sample_chunk("b.md", ChunkKind::Text, &["cooking"])));
    }

    #[test]
    fn test_kind_filter() {
        let filter = ChunkFilter {
            kinds: Some(vec![ChunkKind::Code]),
            ..Default::default()
        };
        assert!(filter.matches(&sample_chunk("a.md", ChunkKind::Code, &[])));
        assert!(!filter.matches(&sample_chunk("a.md", ChunkKind::Table, &[])));
    }
}
