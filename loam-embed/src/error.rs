//! Error types for the embedding boundary.

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Failure modes at the embedding adapter boundary.
///
/// The central distinction is transient vs. permanent: transient failures
/// (network hiccups, rate limits) are worth retrying under a
/// [`RetryPolicy`](crate::retry::RetryPolicy); everything else is not.
/// [`EmbedError::RetriesExhausted`] wraps the final transient error once the
/// attempt ceiling is reached, so callers still see what actually went wrong.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// A failure that may succeed on retry (timeout, rate limit, 5xx).
    #[error("transient embedding failure: {message}")]
    Transient { message: String },

    /// A failure that will not succeed on retry (auth, bad request).
    #[error("permanent embedding failure: {message}")]
    Permanent { message: String },

    /// The adapter's response did not cover a requested id.
    #[error("no embedding returned for id {id}")]
    MissingEmbedding { id: String },

    /// The adapter returned a vector of the wrong dimensionality.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The retry ceiling was reached; the last transient error is attached.
    #[error("embedding retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<EmbedError>,
    },
}

impl EmbedError {
    /// Create a transient error with a custom message.
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Create a permanent error with a custom message.
    pub fn permanent<S: Into<String>>(message: S) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    /// Whether retrying this failure could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EmbedError::transient("timeout").is_transient());
        assert!(!EmbedError::permanent("bad key").is_transient());
        assert!(
            !EmbedError::MissingEmbedding {
                id: "abc".to_string()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_exhaustion_keeps_source() {
        let err = EmbedError::RetriesExhausted {
            attempts: 3,
            source: Box::new(EmbedError::transient("connection reset")),
        };
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("connection reset"));
    }
}
