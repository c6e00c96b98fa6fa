//! Incremental indexing: one corpus walk per run, content-addressed diffing
//! per document.
//!
//! ## Pipeline Flow
//!
//! ```text
//! walk corpus → mtime check → chunk → diff by chunk id
//!      │            │                     │
//!      │         unchanged:          reuse embedding (hash equal)
//!      │         skip entirely      queue for embedding (new/changed)
//!      │                            mark stale (disappeared)
//!      │
//!      └→ after the walk: delete documents no longer observed
//! ```
//!
//! The diff-by-content-hash step is the central efficiency property: editing
//! one paragraph of a large document re-embeds only the chunks whose hash
//! changed, and a run over an unchanged corpus performs zero embedding calls.
//!
//! Failures are isolated per document. An embedding outage, an unreadable
//! file or a missing vector fails that document's update — logged, counted,
//! and the document left at its previous indexed state — never the run.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use half::f16;
use tracing::{debug, error, info, warn};

use loam_chunk::Chunker;
use loam_embed::{EmbedRequest, Embedder};

use crate::storage::{ChunkRecord, Store};

/// Configuration for an indexing run.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Root of the note corpus.
    pub root: PathBuf,
    /// File extensions (lowercase, no dot) the walk picks up.
    pub include_extensions: Vec<String>,
    /// Directory names skipped anywhere in the tree.
    pub ignore_dirs: Vec<String>,
    /// Chunks per embedding batch.
    pub embed_batch_size: usize,
}

impl IndexerConfig {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            include_extensions: vec![
                "md".to_string(),
                "markdown".to_string(),
                "txt".to_string(),
            ],
            ignore_dirs: vec![
                ".git".to_string(),
                ".obsidian".to_string(),
                ".trash".to_string(),
            ],
            embed_batch_size: 16,
        }
    }

    pub fn with_include_extensions(mut self, extensions: Vec<String>) -> Self {
        self.include_extensions = extensions;
        self
    }

    pub fn with_ignore_dirs(mut self, dirs: Vec<String>) -> Self {
        self.ignore_dirs = dirs;
        self
    }

    pub fn with_embed_batch_size(mut self, size: usize) -> Self {
        self.embed_batch_size = size.max(1);
        self
    }
}

/// Counters reported by one indexing run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IndexReport {
    pub documents_processed: usize,
    pub documents_skipped: usize,
    pub documents_removed: usize,
    pub documents_failed: usize,
    pub chunks_upserted: usize,
    pub chunks_deleted: usize,
    pub chunks_embedded: usize,
    /// The run stopped early on a cancellation request. Deletion
    /// reconciliation is skipped in that case: unvisited documents must not
    /// be reaped.
    pub cancelled: bool,
}

/// Cooperative cancellation flag for long walks and embedding batches.
/// Cancelling leaves the store at the last committed transaction.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct DocumentOutcome {
    upserted: usize,
    deleted: usize,
    embedded: usize,
}

/// Orchestrates chunking, diffing, embedding and storage for a corpus.
pub struct Indexer {
    store: Arc<dyn Store>,
    chunker: Chunker,
    embedder: Embedder,
    config: IndexerConfig,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn Store>,
        chunker: Chunker,
        embedder: Embedder,
        config: IndexerConfig,
    ) -> Self {
        Self {
            store,
            chunker,
            embedder,
            config,
        }
    }

    /// Run one full indexing pass over the corpus.
    pub async fn run(&self, cancel: &CancelToken) -> Result<IndexReport> {
        let started = std::time::Instant::now();
        let states = self.store.load_document_states().await?;
        let files = self.collect_files();
        let mut report = IndexReport::default();
        let mut observed: HashSet<String> = HashSet::with_capacity(files.len());

        for (rel_path, abs_path, mtime) in files {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            observed.insert(rel_path.clone());

            if let Some(state) = states.get(&rel_path) {
                if state.mtime == mtime {
                    report.documents_skipped += 1;
                    continue;
                }
            }

            match self.index_document(&rel_path, &abs_path, mtime).await {
                Ok(outcome) => {
                    report.documents_processed += 1;
                    report.chunks_upserted += outcome.upserted;
                    report.chunks_deleted += outcome.deleted;
                    report.chunks_embedded += outcome.embedded;
                }
                Err(err) => {
                    error!("failed to update {rel_path}: {err:#}");
                    report.documents_failed += 1;
                }
            }
        }

        if !report.cancelled {
            for path in states.keys().filter(|p| !observed.contains(*p)) {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                let deleted = self.store.delete_document(path).await?;
                report.documents_removed += 1;
                report.chunks_deleted += deleted;
                debug!("removed {path} ({deleted} chunks)");
            }
        }

        info!(
            processed = report.documents_processed,
            skipped = report.documents_skipped,
            removed = report.documents_removed,
            failed = report.documents_failed,
            chunks_upserted = report.chunks_upserted,
            chunks_deleted = report.chunks_deleted,
            chunks_embedded = report.chunks_embedded,
            cancelled = report.cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "indexing run complete"
        );
        Ok(report)
    }

    /// Walk the corpus and collect `(relative path, absolute path, mtime)`
    /// for every file matching the extension allowlist.
    fn collect_files(&self) -> Vec<(String, PathBuf, i64)> {
        let ignore_dirs = self.config.ignore_dirs.clone();
        let mut builder = ignore::WalkBuilder::new(&self.config.root);
        builder
            .hidden(true)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .follow_links(false)
            .filter_entry(move |entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if is_dir {
                    let name = entry.file_name().to_string_lossy();
                    !ignore_dirs.iter().any(|d| d.as_str() == name.as_ref())
                } else {
                    true
                }
            });

        let mut files = Vec::new();
        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("walk error: {err}");
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase());
            let included = extension
                .map(|e| self.config.include_extensions.iter().any(|i| *i == e))
                .unwrap_or(false);
            if !included {
                continue;
            }
            let mtime = match file_mtime(path) {
                Ok(mtime) => mtime,
                Err(err) => {
                    warn!("skipping {}: {err:#}", path.display());
                    continue;
                }
            };
            let rel = path
                .strip_prefix(&self.config.root)
                .unwrap_or(path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push((rel, path.to_path_buf(), mtime));
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));
        files
    }

    /// Re-chunk one document, diff against stored state, embed only what
    /// changed and commit. Any error leaves the document at its previous
    /// indexed state.
    async fn index_document(
        &self,
        rel_path: &str,
        abs_path: &Path,
        mtime: i64,
    ) -> Result<DocumentOutcome> {
        let text = tokio::fs::read_to_string(abs_path)
            .await
            .with_context(|| format!("reading {}", abs_path.display()))?;

        let notes = self.chunker.chunk(rel_path, &text);
        let stored = self.store.load_document_chunks(rel_path).await?;

        let mut records: Vec<ChunkRecord> = Vec::with_capacity(notes.len());
        let mut to_embed: Vec<EmbedRequest> = Vec::new();
        for note in notes {
            let mut record = ChunkRecord::from_note(note, mtime);
            match stored.get(&record.id) {
                Some(old) if old.content_hash == record.content_hash => {
                    record.embedding = old.embedding.clone();
                    if record.embedding.is_none() {
                        // Stored but never embedded (e.g. an earlier failed
                        // run); queue it now.
                        to_embed.push(EmbedRequest::new(
                            record.id.clone(),
                            record.representation.clone(),
                        ));
                    }
                }
                _ => {
                    to_embed.push(EmbedRequest::new(
                        record.id.clone(),
                        record.representation.clone(),
                    ));
                }
            }
            records.push(record);
        }

        let new_ids: HashSet<&String> = records.iter().map(|r| &r.id).collect();
        let stale: Vec<String> = stored
            .keys()
            .filter(|id| !new_ids.contains(id))
            .cloned()
            .collect();

        let embedded = to_embed.len();
        if !to_embed.is_empty() {
            let vectors = self.embedder.embed(&to_embed).await?;
            let mut by_id: HashMap<String, Vec<f32>> =
                vectors.into_iter().map(|v| (v.id, v.vector)).collect();
            for record in &mut records {
                if record.embedding.is_none() {
                    // A queued chunk without a vector means a partial write;
                    // fail the document instead of silently dropping it.
                    let vector = by_id.remove(&record.id).ok_or_else(|| {
                        anyhow::anyhow!("no embedding returned for chunk {} of {rel_path}", record.id)
                    })?;
                    record.embedding =
                        Some(vector.into_iter().map(f16::from_f32).collect());
                }
            }
        }

        let deleted = if stale.is_empty() {
            0
        } else {
            self.store.delete_chunks_by_ids(&stale).await?
        };
        let upserted = records.len();
        self.store.upsert_chunks(&records).await?;

        debug!(
            "updated {rel_path}: {upserted} chunks ({embedded} embedded, {deleted} stale removed)"
        );
        Ok(DocumentOutcome {
            upserted,
            deleted,
            embedded,
        })
    }
}

fn file_mtime(path: &Path) -> Result<i64> {
    let metadata = std::fs::metadata(path)?;
    let mtime = metadata
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs() as i64;
    Ok(mtime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_config_defaults() {
        let config = IndexerConfig::new(PathBuf::from("/corpus"));
        assert!(config.include_extensions.contains(&"md".to_string()));
        assert!(config.ignore_dirs.contains(&".obsidian".to_string()));
        assert!(config.embed_batch_size > 0);
    }
}
