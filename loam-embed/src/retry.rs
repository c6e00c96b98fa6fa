//! Retry policy and the batching executor.
//!
//! [`RetryPolicy`] is a plain value — max attempts plus an exponential
//! backoff curve — independent of any particular provider or concurrency
//! primitive. [`Embedder`] wraps a provider with that policy and a batch
//! size: requests are split into bounded batches processed sequentially (not
//! fanned out), which keeps the number of outstanding requests at one and
//! respects adapter-side rate limits. Each batch retries independently;
//! exhausting the ceiling fails the whole call so callers never receive a
//! silently incomplete result set.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::{EmbedError, Result};
use crate::provider::{EmbedRequest, EmbedVector, EmbeddingProvider};

/// Exponential-backoff retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per batch, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per attempt thereafter.
    pub base_delay: Duration,
    /// Ceiling on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Delay to sleep after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// A provider wrapped with batching and retry.
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
    batch_size: usize,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, policy: RetryPolicy, batch_size: usize) -> Self {
        Self {
            provider,
            policy,
            batch_size: batch_size.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    /// Embed all requests in sequential bounded batches.
    ///
    /// Every returned vector is checked against the provider's declared
    /// dimensionality. Any batch failing permanently, or transiently past
    /// the retry ceiling, fails the whole call.
    pub async fn embed(&self, requests: &[EmbedRequest]) -> Result<Vec<EmbedVector>> {
        let mut out = Vec::with_capacity(requests.len());
        for batch in requests.chunks(self.batch_size) {
            let vectors = self.embed_batch(batch).await?;
            for vector in &vectors {
                if vector.vector.len() != self.provider.dimension() {
                    return Err(EmbedError::DimensionMismatch {
                        expected: self.provider.dimension(),
                        actual: vector.vector.len(),
                    });
                }
            }
            out.extend(vectors);
        }
        Ok(out)
    }

    async fn embed_batch(&self, batch: &[EmbedRequest]) -> Result<Vec<EmbedVector>> {
        let mut attempt = 1u32;
        loop {
            match self.provider.embed(batch).await {
                Ok(vectors) => return Ok(vectors),
                Err(err) if err.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "transient embedding failure, backing off: {err}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    return Err(EmbedError::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that fails transiently a fixed number of times, then
    /// succeeds, recording each batch it sees.
    struct FlakyProvider {
        failures_left: Mutex<u32>,
        calls: AtomicUsize,
        batch_sizes: Mutex<Vec<usize>>,
        dimension: usize,
    }

    impl FlakyProvider {
        fn new(failures: u32, dimension: usize) -> Self {
            Self {
                failures_left: Mutex::new(failures),
                calls: AtomicUsize::new(0),
                batch_sizes: Mutex::new(Vec::new()),
                dimension,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        async fn embed(&self, requests: &[EmbedRequest]) -> Result<Vec<EmbedVector>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batch_sizes.lock().unwrap().push(requests.len());
            {
                let mut failures = self.failures_left.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(EmbedError::transient("synthetic outage"));
                }
            }
            Ok(requests
                .iter()
                .map(|r| EmbedVector {
                    id: r.id.clone(),
                    vector: vec![1.0; self.dimension],
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn provider_name(&self) -> &str {
            "flaky"
        }
    }

    struct PermanentFailure;

    #[async_trait]
    impl EmbeddingProvider for PermanentFailure {
        async fn embed(&self, _requests: &[EmbedRequest]) -> Result<Vec<EmbedVector>> {
            Err(EmbedError::permanent("invalid credentials"))
        }

        fn dimension(&self) -> usize {
            4
        }

        fn provider_name(&self) -> &str {
            "permanent-failure"
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(4))
    }

    fn requests(n: usize) -> Vec<EmbedRequest> {
        (0..n)
            .map(|i| EmbedRequest::new(format!("chunk-{i}"), format!("text {i}")))
            .collect()
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(4), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let provider = Arc::new(FlakyProvider::new(2, 4));
        let embedder = Embedder::new(provider.clone(), fast_policy(3), 8);

        let vectors = embedder.embed(&requests(3)).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_ceiling_surfaces_exhaustion() {
        let provider = Arc::new(FlakyProvider::new(10, 4));
        let embedder = Embedder::new(provider.clone(), fast_policy(3), 8);

        let err = embedder.embed(&requests(1)).await.unwrap_err();
        match err {
            EmbedError::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(source.is_transient());
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let embedder = Embedder::new(Arc::new(PermanentFailure), fast_policy(5), 8);
        let err = embedder.embed(&requests(1)).await.unwrap_err();
        assert!(matches!(err, EmbedError::Permanent { .. }));
    }

    #[tokio::test]
    async fn test_requests_split_into_bounded_batches() {
        let provider = Arc::new(FlakyProvider::new(0, 4));
        let embedder = Embedder::new(provider.clone(), fast_policy(1), 4);

        let vectors = embedder.embed(&requests(10)).await.unwrap();
        assert_eq!(vectors.len(), 10);
        assert_eq!(*provider.batch_sizes.lock().unwrap(), vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_permanent() {
        struct WrongDims;

        #[async_trait]
        impl EmbeddingProvider for WrongDims {
            async fn embed(&self, requests: &[EmbedRequest]) -> Result<Vec<EmbedVector>> {
                Ok(requests
                    .iter()
                    .map(|r| EmbedVector {
                        id: r.id.clone(),
                        vector: vec![1.0, 2.0],
                    })
                    .collect())
            }

            fn dimension(&self) -> usize {
                4
            }

            fn provider_name(&self) -> &str {
                "wrong-dims"
            }
        }

        let embedder = Embedder::new(Arc::new(WrongDims), fast_policy(1), 8);
        let err = embedder.embed(&requests(1)).await.unwrap_err();
        assert!(matches!(
            err,
            EmbedError::DimensionMismatch {
                expected: 4,
                actual: 2
            }
        ));
    }
}
