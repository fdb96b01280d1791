//! Embedding provider settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::EmbeddingError;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_BATCH_SIZE: usize = 100;
const DEFAULT_MAX_TOKENS_PER_BATCH: usize = 8_000;
const DEFAULT_DELAY_BETWEEN_BATCHES_MS: u64 = 100;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Embedding provider and batching configuration.
///
/// Read once at startup; every field has a default so a partial YAML
/// section is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Full URL of the embeddings endpoint
    pub endpoint: String,
    /// Model name sent in the request body
    pub model: String,
    /// Inline API key; takes precedence over `api_key_env`
    pub api_key: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    /// Per-request HTTP timeout
    pub timeout_secs: u64,
    /// Expected vector length; checked when set
    pub dimension: Option<usize>,
    /// Maximum texts per provider call
    pub max_batch_size: usize,
    /// Estimated token budget per provider call
    pub max_tokens_per_batch: usize,
    /// Pause between consecutive batches
    pub delay_between_batches_ms: u64,
    /// Total attempts per provider call
    pub max_retries: u32,
    /// Base of the exponential backoff
    pub retry_base_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            api_key_env: Some(DEFAULT_API_KEY_ENV.to_string()),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            dimension: None,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_tokens_per_batch: DEFAULT_MAX_TOKENS_PER_BATCH,
            delay_between_batches_ms: DEFAULT_DELAY_BETWEEN_BATCHES_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }
}

impl EmbeddingConfig {
    /// Resolve the bearer token: inline key first, then the named env var.
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(ToString::to_string)
            .or_else(|| {
                let var = self.api_key_env.as_deref()?.trim();
                std::env::var(var)
                    .ok()
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
            })
    }

    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Batch defaults taken from this config.
    #[must_use]
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            max_batch_size: self.max_batch_size,
            max_tokens_per_batch: self.max_tokens_per_batch,
            delay_between_batches: Duration::from_millis(self.delay_between_batches_ms),
        }
    }

    /// Reject values the service cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::InvalidInput`] naming the first bad field.
    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if self.endpoint.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "embedding.endpoint must not be empty".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "embedding.model must not be empty".to_string(),
            ));
        }
        self.batch_options().validate()?;
        if self.dimension == Some(0) {
            return Err(EmbeddingError::InvalidInput(
                "embedding.dimension must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-call batching overrides for
/// [`EmbeddingService::generate_batch_embeddings`](crate::EmbeddingService::generate_batch_embeddings).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Maximum texts per provider call
    pub max_batch_size: usize,
    /// Estimated token budget per provider call
    pub max_tokens_per_batch: usize,
    /// Pause between consecutive batches
    pub delay_between_batches: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        EmbeddingConfig::default().batch_options()
    }
}

impl BatchOptions {
    /// Builder: set the batch size limit.
    #[must_use]
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Builder: set the token budget.
    #[must_use]
    pub fn with_max_tokens_per_batch(mut self, max_tokens_per_batch: usize) -> Self {
        self.max_tokens_per_batch = max_tokens_per_batch;
        self
    }

    /// Builder: set the inter-batch delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_between_batches = delay;
        self
    }

    /// Both limits must be positive.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::InvalidInput`] when a limit is zero.
    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if self.max_batch_size == 0 {
            return Err(EmbeddingError::InvalidInput(
                "max_batch_size must be positive".to_string(),
            ));
        }
        if self.max_tokens_per_batch == 0 {
            return Err(EmbeddingError::InvalidInput(
                "max_tokens_per_batch must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: EmbeddingConfig =
            serde_json::from_str(r#"{"model":"bge-m3","max_batch_size":16}"#).unwrap();
        assert_eq!(config.model, "bge-m3");
        assert_eq!(config.max_batch_size, 16);
        assert_eq!(config.max_tokens_per_batch, DEFAULT_MAX_TOKENS_PER_BATCH);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inline_api_key_wins() {
        let config = EmbeddingConfig {
            api_key: Some("  sk-inline ".to_string()),
            api_key_env: Some("OMNI_EMBEDDING_TEST_UNSET_VAR".to_string()),
            ..EmbeddingConfig::default()
        };
        assert_eq!(config.resolve_api_key().as_deref(), Some("sk-inline"));
    }

    #[test]
    fn test_zero_batch_size_is_invalid() {
        let config = EmbeddingConfig {
            max_batch_size: 0,
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EmbeddingError::InvalidInput(_))
        ));
    }
}
