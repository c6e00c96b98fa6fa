//! SQLite implementation of the [`Store`] contract.
//!
//! One database file holds three logical tables:
//!
//! ```sql
//! -- Documents: aggregate state per source file
//! CREATE TABLE documents (
//!     path TEXT PRIMARY KEY,           -- corpus-relative path
//!     mtime INTEGER,                   -- max(chunk mtime), unix seconds
//!     content_hash TEXT,               -- blake3 over ordered chunk hashes
//!     chunk_count INTEGER,
//!     indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//!
//! -- Chunks: the retrieval units, with serialized metadata and vectors
//! CREATE TABLE chunks (
//!     chunk_id TEXT PRIMARY KEY,       -- blake3 of (path, headings, ordinal)
//!     path TEXT,                       -- owning document
//!     heading_path TEXT,               -- JSON array, outermost first
//!     ordinal INTEGER,
//!     kind TEXT,
//!     content TEXT,
//!     representation TEXT,             -- the embedded form
//!     content_hash TEXT,
//!     tags TEXT,                       -- JSON array
//!     links TEXT,                      -- JSON array
//!     token_count INTEGER,
//!     mtime INTEGER,
//!     embedding BLOB                   -- f16 vector (optional)
//! );
//!
//! -- Lexical index: FTS5 mirror of chunk content
//! CREATE VIRTUAL TABLE chunks_fts USING fts5(content, chunk_id UNINDEXED);
//! ```
//!
//! The FTS5 mirror is maintained inside the same transaction as every chunk
//! write, and document aggregates are recomputed whenever a document's chunk
//! set changes, so the three tables can never drift apart across a crash.
//!
//! ## SQLite configuration
//!
//! - **WAL mode**: concurrent readers during an indexing run
//! - **Foreign keys / busy timeout / auto-vacuum**: as for any long-lived
//!   single-file index
//! - **64KB pages**: embedding blobs dominate the row size

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use itertools::Itertools;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use loam_chunk::ChunkKind;

use super::{ChunkFilter, ChunkRecord, DocumentState, LexicalHit, Store};

/// Over-fetch multiplier for filtered lexical queries: the FTS engine ranks
/// before the filter applies, so fetch extra rows to fill the limit.
const LEXICAL_FETCH_FACTOR: usize = 10;

/// SQLite-backed store. Cheap to clone; all clones share one pool.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a persistent store at the given database path.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(db_path)
                    .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                    .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                    .busy_timeout(std::time::Duration::from_secs(5))
                    .foreign_keys(true)
                    .create_if_missing(true)
                    .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::Full)
                    .page_size(1 << 16)
                    .optimize_on_close(true, 1 << 10),
            )
            .await?;
        Self::new_with_pool(pool).await
    }

    /// Open an in-memory store for testing.
    pub async fn open_memory() -> Result<Self> {
        // A single connection: each new in-memory connection would otherwise
        // be a fresh empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                path TEXT PRIMARY KEY,
                mtime INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                chunk_count INTEGER NOT NULL,
                indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                heading_path TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                kind TEXT NOT NULL,
                content TEXT NOT NULL,
                representation TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                tags TEXT NOT NULL,
                links TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                mtime INTEGER NOT NULL,
                embedding BLOB
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(content, chunk_id UNINDEXED)",
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(path)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_mtime ON documents(mtime)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Get the underlying SQLite connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Result<ChunkRecord> {
        let heading_path: String = row.get("heading_path");
        let tags: String = row.get("tags");
        let links: String = row.get("links");
        let kind: String = row.get("kind");
        let embedding_bytes: Option<Vec<u8>> = row.get("embedding");

        let embedding = match embedding_bytes {
            Some(bytes) => {
                if bytes.len() % 2 != 0 {
                    anyhow::bail!("malformed embedding blob ({} bytes)", bytes.len());
                }
                Some(bytemuck::cast_slice::<u8, half::f16>(&bytes).to_vec())
            }
            None => None,
        };

        Ok(ChunkRecord {
            id: row.get("chunk_id"),
            path: row.get("path"),
            heading_path: serde_json::from_str(&heading_path).unwrap_or_default(),
            ordinal: row.get::<i64, _>("ordinal") as usize,
            kind: ChunkKind::parse(&kind),
            content: row.get("content"),
            representation: row.get("representation"),
            content_hash: row.get("content_hash"),
            tags: serde_json::from_str(&tags).unwrap_or_default(),
            links: serde_json::from_str(&links).unwrap_or_default(),
            token_count: row.get::<i64, _>("token_count") as usize,
            mtime: row.get("mtime"),
            embedding,
        })
    }

    /// Recompute one document's aggregate row from its current chunk set.
    /// Removes the document row when no chunks remain.
    async fn refresh_document_state(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        path: &str,
    ) -> Result<()> {
        let rows =
            sqlx::query("SELECT content_hash, mtime FROM chunks WHERE path = ?1 ORDER BY ordinal")
                .bind(path)
                .fetch_all(&mut **tx)
                .await?;

        if rows.is_empty() {
            sqlx::query("DELETE FROM documents WHERE path = ?1")
                .bind(path)
                .execute(&mut **tx)
                .await?;
            return Ok(());
        }

        let mut hasher = blake3::Hasher::new();
        let mut mtime = i64::MIN;
        for row in &rows {
            let hash: String = row.get("content_hash");
            hasher.update(hash.as_bytes());
            hasher.update(&[0]);
            mtime = mtime.max(row.get::<i64, _>("mtime"));
        }
        let content_hash = hex::encode(hasher.finalize().as_bytes());

        sqlx::query(
            r#"
            INSERT INTO documents (path, mtime, content_hash, chunk_count, indexed_at)
            VALUES (?1, ?2, ?3, ?4, datetime('now'))
            ON CONFLICT(path) DO UPDATE SET
                mtime = excluded.mtime,
                content_hash = excluded.content_hash,
                chunk_count = excluded.chunk_count,
                indexed_at = datetime('now')
            "#,
        )
        .bind(path)
        .bind(mtime)
        .bind(content_hash)
        .bind(rows.len() as i64)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn load_document_states(&self) -> Result<HashMap<String, DocumentState>> {
        let rows = sqlx::query("SELECT path, mtime, content_hash, chunk_count FROM documents")
            .fetch_all(&self.pool)
            .await?;

        let mut states = HashMap::with_capacity(rows.len());
        for row in rows {
            states.insert(
                row.get::<String, _>("path"),
                DocumentState {
                    mtime: row.get("mtime"),
                    chunk_count: row.get::<i64, _>("chunk_count") as usize,
                    content_hash: row.get("content_hash"),
                },
            );
        }
        Ok(states)
    }

    async fn load_document_chunks(&self, path: &str) -> Result<HashMap<String, ChunkRecord>> {
        let rows = sqlx::query(
            "SELECT chunk_id, path, heading_path, ordinal, kind, content, representation,
                    content_hash, tags, links, token_count, mtime, embedding
             FROM chunks WHERE path = ?1 ORDER BY ordinal",
        )
        .bind(path)
        .fetch_all(&self.pool)
        .await?;

        let mut chunks = HashMap::with_capacity(rows.len());
        for row in rows {
            let chunk = Self::decode_row(&row)?;
            chunks.insert(chunk.id.clone(), chunk);
        }
        Ok(chunks)
    }

    async fn upsert_chunks(&self, chunks: &[ChunkRecord]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            let embedding_bytes = chunk
                .embedding
                .as_ref()
                .map(|e| bytemuck::cast_slice::<half::f16, u8>(e));

            sqlx::query(
                r#"
                INSERT INTO chunks
                    (chunk_id, path, heading_path, ordinal, kind, content, representation,
                     content_hash, tags, links, token_count, mtime, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    path = excluded.path,
                    heading_path = excluded.heading_path,
                    ordinal = excluded.ordinal,
                    kind = excluded.kind,
                    content = excluded.content,
                    representation = excluded.representation,
                    content_hash = excluded.content_hash,
                    tags = excluded.tags,
                    links = excluded.links,
                    token_count = excluded.token_count,
                    mtime = excluded.mtime,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.path)
            .bind(serde_json::to_string(&chunk.heading_path)?)
            .bind(chunk.ordinal as i64)
            .bind(chunk.kind.as_str())
            .bind(&chunk.content)
            .bind(&chunk.representation)
            .bind(&chunk.content_hash)
            .bind(serde_json::to_string(&chunk.tags)?)
            .bind(serde_json::to_string(&chunk.links)?)
            .bind(chunk.token_count as i64)
            .bind(chunk.mtime)
            .bind(embedding_bytes)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM chunks_fts WHERE chunk_id = ?1")
                .bind(&chunk.id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT INTO chunks_fts (chunk_id, content) VALUES (?1, ?2)")
                .bind(&chunk.id)
                .bind(&chunk.content)
                .execute(&mut *tx)
                .await?;
        }

        let unique_paths: Vec<&str> = chunks.iter().map(|c| c.path.as_str()).unique().collect();
        for path in unique_paths {
            Self::refresh_document_state(&mut tx, path).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_chunks_by_ids(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = ids
            .iter()
            .enumerate()
            .map(|(i, _)| format!("?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");

        let mut tx = self.pool.begin().await?;

        // Affected documents, before the rows disappear.
        let path_query =
            format!("SELECT DISTINCT path FROM chunks WHERE chunk_id IN ({placeholders})");
        let mut query = sqlx::query_scalar::<_, String>(&path_query);
        for id in ids {
            query = query.bind(id);
        }
        let paths = query.fetch_all(&mut *tx).await?;

        let delete_chunks = format!("DELETE FROM chunks WHERE chunk_id IN ({placeholders})");
        let mut query = sqlx::query(&delete_chunks);
        for id in ids {
            query = query.bind(id);
        }
        let deleted = query.execute(&mut *tx).await?.rows_affected() as usize;

        let delete_fts = format!("DELETE FROM chunks_fts WHERE chunk_id IN ({placeholders})");
        let mut query = sqlx::query(&delete_fts);
        for id in ids {
            query = query.bind(id);
        }
        query.execute(&mut *tx).await?;

        for path in &paths {
            Self::refresh_document_state(&mut tx, path).await?;
        }

        tx.commit().await?;
        Ok(deleted)
    }

    async fn delete_document(&self, path: &str) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM chunks_fts WHERE chunk_id IN (SELECT chunk_id FROM chunks WHERE path = ?1)",
        )
        .bind(path)
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM chunks WHERE path = ?1")
            .bind(path)
            .execute(&mut *tx)
            .await?
            .rows_affected() as usize;

        sqlx::query("DELETE FROM documents WHERE path = ?1")
            .bind(path)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted)
    }

    async fn list_all_chunks(&self) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            "SELECT chunk_id, path, heading_path, ordinal, kind, content, representation,
                    content_hash, tags, links, token_count, mtime, embedding
             FROM chunks ORDER BY path, ordinal",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::decode_row).collect()
    }

    async fn lexical_search(
        &self,
        query: &str,
        limit: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<LexicalHit>> {
        // Reduce the query to quoted alphanumeric terms: anything the FTS5
        // parser could choke on is gone before it ever sees the string.
        let terms: Vec<String> = query
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| format!("\"{t}\""))
            .collect();
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let match_expr = terms.join(" AND ");

        let fetch_limit = if filter.is_empty() {
            limit
        } else {
            limit.saturating_mul(LEXICAL_FETCH_FACTOR)
        };

        let result = sqlx::query(
            "SELECT c.chunk_id, c.path, c.heading_path, c.ordinal, c.kind, c.content,
                    c.representation, c.content_hash, c.tags, c.links, c.token_count,
                    c.mtime, c.embedding, chunks_fts.rank AS rank
             FROM chunks_fts
             JOIN chunks AS c ON c.chunk_id = chunks_fts.chunk_id
             WHERE chunks_fts MATCH ?1
             ORDER BY chunks_fts.rank
             LIMIT ?2",
        )
        .bind(&match_expr)
        .bind(fetch_limit as i64)
        .fetch_all(&self.pool)
        .await;

        // Lexical search is a best-effort signal: a query the engine cannot
        // execute contributes zero candidates instead of an error.
        let rows = match result {
            Ok(rows) => rows,
            Err(err) => {
                debug!("lexical query failed, returning no candidates: {err}");
                return Ok(Vec::new());
            }
        };

        let mut hits = Vec::new();
        for row in rows {
            let chunk = Self::decode_row(&row)?;
            if !filter.matches(&chunk) {
                continue;
            }
            let rank: f64 = row.get("rank");
            hits.push(LexicalHit {
                chunk,
                score: (1.0 / (1.0 + rank.abs())) as f32,
            });
            if hits.len() >= limit {
                break;
            }
        }
        Ok(hits)
    }

    async fn list_indexed_paths(&self) -> Result<Vec<String>> {
        let paths = sqlx::query_scalar::<_, String>("SELECT path FROM documents ORDER BY path")
            .fetch_all(&self.pool)
            .await?;
        Ok(paths)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
