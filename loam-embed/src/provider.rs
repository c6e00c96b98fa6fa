//! The embedding provider contract.
//!
//! A provider converts batches of `{id, text}` requests into `{id, vector}`
//! responses. Concrete providers (HTTP clients, local ONNX runtimes) live
//! outside this crate; the engine only depends on this trait and on the
//! guarantee that returned vectors are unit-normalized, which is what makes
//! plain dot products equivalent to cosine similarity downstream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One text to embed, keyed by the caller's id (typically a chunk id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedRequest {
    pub id: String,
    pub text: String,
}

impl EmbedRequest {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// One embedding result, keyed by the request id.
#[derive(Debug, Clone)]
pub struct EmbedVector {
    pub id: String,
    pub vector: Vec<f32>,
}

/// Trait for embedding providers.
///
/// Implementations must return unit-normalized vectors of a fixed
/// dimensionality, one per request, and should signal retryable failures
/// with [`EmbedError::transient`](crate::EmbedError::transient) so the retry
/// layer can distinguish them from permanent ones.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts. Order and coverage of the response are the
    /// provider's responsibility; the caller matches results by id.
    async fn embed(&self, requests: &[EmbedRequest]) -> Result<Vec<EmbedVector>>;

    /// Dimensionality of the vectors this provider produces.
    fn dimension(&self) -> usize;

    /// Name/identifier of this provider.
    fn provider_name(&self) -> &str;
}

/// Scale a vector to unit length in place. Zero vectors are left unchanged.
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}
