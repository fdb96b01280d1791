//! Error types for retrieval operations.

use omni_embedding::EmbeddingError;
use thiserror::Error;

/// Errors for hybrid retrieval
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Malformed request or fusion input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Query embedding failed
    #[error(transparent)]
    Embedding(EmbeddingError),

    /// Vector store unreachable or failing; fatal for a search
    #[error("Vector backend error: {0}")]
    VectorBackend(String),

    /// Text matcher failing; searches degrade to vector-only
    #[error("Text backend error: {0}")]
    TextBackend(String),

    /// The caller cancelled the request
    #[error("Search cancelled")]
    Cancelled,
}

impl RetrievalError {
    /// Taxonomy name surfaced to callers.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "InvalidInputError",
            Self::Embedding(error) => error.kind(),
            Self::VectorBackend(_) | Self::TextBackend(_) => "RetrievalBackendError",
            Self::Cancelled => "Cancelled",
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<EmbeddingError> for RetrievalError {
    fn from(error: EmbeddingError) -> Self {
        match error {
            EmbeddingError::Cancelled => Self::Cancelled,
            other => Self::Embedding(other),
        }
    }
}

/// Result alias for retrieval operations
pub type Result<T> = std::result::Result<T, RetrievalError>;

#[cfg(test)]
mod tests {
    use omni_embedding::EmbeddingError;

    use super::RetrievalError;

    #[test]
    fn test_embedding_errors_keep_their_taxonomy() {
        let error: RetrievalError = EmbeddingError::BatchMismatch {
            expected: 2,
            actual: 1,
        }
        .into();
        assert_eq!(error.kind(), "EmbeddingBatchMismatchError");

        let cancelled: RetrievalError = EmbeddingError::Cancelled.into();
        assert!(matches!(cancelled, RetrievalError::Cancelled));
    }

    #[test]
    fn test_backend_errors_share_one_kind() {
        assert_eq!(
            RetrievalError::TextBackend("down".into()).kind(),
            RetrievalError::VectorBackend("down".into()).kind()
        );
    }
}
