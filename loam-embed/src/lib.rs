//! # loam-embed
//!
//! The embedding adapter boundary for the loam retrieval engine. This crate
//! does not talk to any model: it defines the contract concrete adapters
//! implement and the machinery the engine uses to call them safely.
//!
//! ## What lives here
//!
//! - [`EmbeddingProvider`]: async trait turning `{id, text}` batches into
//!   `{id, vector}` batches of unit-normalized vectors
//! - [`EmbedError`]: typed failures, with the transient/permanent split that
//!   drives retry decisions
//! - [`RetryPolicy`]: an explicit policy value — attempt ceiling plus
//!   exponential backoff — not tied to any concurrency primitive
//! - [`Embedder`]: a provider wrapped with that policy and a batch size;
//!   batches run sequentially so outstanding request volume stays bounded
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use loam_embed::{EmbedRequest, Embedder, EmbeddingProvider, RetryPolicy};
//!
//! # async fn example(provider: Arc<dyn EmbeddingProvider>) -> loam_embed::Result<()> {
//! let embedder = Embedder::new(provider, RetryPolicy::default(), 16);
//! let vectors = embedder
//!     .embed(&[EmbedRequest::new("chunk-1", "passage text")])
//!     .await?;
//! assert_eq!(vectors[0].id, "chunk-1");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod provider;
pub mod retry;

pub use error::{EmbedError, Result};
pub use provider::{EmbedRequest, EmbedVector, EmbeddingProvider, normalize};
pub use retry::{Embedder, RetryPolicy};
