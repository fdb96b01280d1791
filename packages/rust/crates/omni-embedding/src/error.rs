//! Error types for embedding generation.

use thiserror::Error;

/// Errors for embedding operations.
///
/// Only [`EmbeddingError::Transient`] is retried by
/// [`retry_with_backoff`](crate::retry_with_backoff); everything else
/// surfaces on the first attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    /// Malformed request (empty text, bad option values)
    #[error("Invalid embedding input: {0}")]
    InvalidInput(String),

    /// Rate limiting, provider 5xx, or a transport failure
    #[error("Transient embedding failure: {message}")]
    Transient {
        /// HTTP status when the provider answered
        status: Option<u16>,
        /// Provider or transport message
        message: String,
    },

    /// Provider refused the batch because of its size or token count
    #[error(
        "Embedding batch too large: {message} (reduce max_batch_size or max_tokens_per_batch)"
    )]
    BatchTooLarge {
        /// HTTP status of the refusal
        status: Option<u16>,
        /// Provider message
        message: String,
    },

    /// Any other non-2xx answer (auth, unknown model, bad request)
    #[error("Embedding request rejected (HTTP {status}): {message}")]
    Rejected {
        /// HTTP status of the refusal
        status: u16,
        /// Provider message
        message: String,
    },

    /// 2xx answer whose body did not decode
    #[error("Malformed embedding response: {0}")]
    MalformedResponse(String),

    /// Provider returned the wrong number of vectors
    #[error("Embedding batch mismatch: expected {expected} vectors, got {actual}")]
    BatchMismatch {
        /// Number of input texts
        expected: usize,
        /// Number of vectors returned
        actual: usize,
    },

    /// Provider returned a vector of the wrong length
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension
        expected: usize,
        /// Length of the offending vector
        actual: usize,
    },

    /// The caller cancelled the operation
    #[error("Embedding cancelled")]
    Cancelled,
}

impl EmbeddingError {
    /// Taxonomy name surfaced to callers.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "InvalidInputError",
            Self::Transient { .. } => "EmbeddingTransientError",
            Self::BatchTooLarge { .. } | Self::Rejected { .. } | Self::MalformedResponse(_) => {
                "EmbeddingFatalError"
            }
            Self::BatchMismatch { .. } | Self::DimensionMismatch { .. } => {
                "EmbeddingBatchMismatchError"
            }
            Self::Cancelled => "Cancelled",
        }
    }

    /// True if another attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Classify a non-2xx provider answer.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = provider_message(body);
        if status == 429 || (500..600).contains(&status) {
            return Self::Transient {
                status: Some(status),
                message,
            };
        }
        if status == 413 || ((status == 400 || status == 422) && mentions_size_limit(&message)) {
            return Self::BatchTooLarge {
                status: Some(status),
                message,
            };
        }
        Self::Rejected { status, message }
    }
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return Self::MalformedResponse(error.to_string());
        }
        if error.is_builder() {
            return Self::InvalidInput(error.to_string());
        }
        // timeout, connect, reset, body read
        Self::Transient {
            status: error.status().map(|status| status.as_u16()),
            message: error.to_string(),
        }
    }
}

/// Pull `error.message` (OpenAI shape) or `message` out of a JSON body.
fn provider_message(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let nested = value
            .get("error")
            .and_then(|error| error.get("message").or(Some(error)))
            .and_then(serde_json::Value::as_str);
        if let Some(message) = nested.or_else(|| value.get("message").and_then(|m| m.as_str())) {
            return message.to_string();
        }
    }
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.chars().take(512).collect()
    }
}

const SIZE_LIMIT_MARKERS: &[&str] = &[
    "maximum context length",
    "too many tokens",
    "token limit",
    "max_tokens_per_request",
    "batch size",
    "too many inputs",
    "too large",
    "request too large",
];

fn mentions_size_limit(message: &str) -> bool {
    let lower = message.to_lowercase();
    SIZE_LIMIT_MARKERS.iter().any(|marker| lower.contains(marker))
}
