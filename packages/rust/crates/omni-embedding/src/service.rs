//! Embedding service: single and batched generation on top of a transport.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::batching::{estimate_tokens, plan_batches};
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::transport::{EmbeddingTransport, HttpEmbeddingTransport};
use crate::{BatchOptions, EmbeddingConfig, EmbeddingError};

/// Turns text into vectors through an [`EmbeddingTransport`].
///
/// Holds no per-request state; share one instance behind an `Arc`.
#[derive(Clone)]
pub struct EmbeddingService {
    transport: Arc<dyn EmbeddingTransport>,
    retry: RetryPolicy,
    batch: BatchOptions,
    dimension: Option<usize>,
}

impl EmbeddingService {
    /// Service over an arbitrary transport.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::InvalidInput`] if `config` is invalid.
    pub fn new(
        transport: Arc<dyn EmbeddingTransport>,
        config: &EmbeddingConfig,
    ) -> Result<Self, EmbeddingError> {
        config.validate()?;
        Ok(Self {
            transport,
            retry: RetryPolicy::new(config.max_retries, config.retry_base_delay_ms),
            batch: config.batch_options(),
            dimension: config.dimension,
        })
    }

    /// Service over the HTTP provider described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::InvalidInput`] if `config` is invalid.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let transport = HttpEmbeddingTransport::new(config)?;
        Self::new(Arc::new(transport), config)
    }

    /// Batch defaults used when a caller passes no overrides.
    #[must_use]
    pub fn default_batch_options(&self) -> BatchOptions {
        self.batch
    }

    /// Embed one text, retrying transient failures.
    ///
    /// # Errors
    ///
    /// [`EmbeddingError::InvalidInput`] for blank text; otherwise the last
    /// provider error once retries are exhausted, or
    /// [`EmbeddingError::Cancelled`].
    pub async fn generate_embedding(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "cannot embed empty text".to_string(),
            ));
        }
        let texts = [text.to_string()];
        let mut vectors = self.embed_with_retry(&texts, cancel).await?;
        vectors.pop().ok_or(EmbeddingError::BatchMismatch {
            expected: 1,
            actual: 0,
        })
    }

    /// Embed many texts, preserving input order.
    ///
    /// Batches are planned greedily under `options` (count limit and estimated
    /// token budget) and sent one after another with
    /// `options.delay_between_batches` in between. A failed multi-item batch
    /// falls back to embedding its items one by one; a failed single-item
    /// batch propagates. Count mismatches are never retried or repaired.
    ///
    /// # Errors
    ///
    /// [`EmbeddingError::InvalidInput`] for blank texts or bad options,
    /// [`EmbeddingError::BatchMismatch`] on provider contract violations,
    /// the provider error of a failing single item, or
    /// [`EmbeddingError::Cancelled`].
    pub async fn generate_batch_embeddings(
        &self,
        texts: &[String],
        options: Option<BatchOptions>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let options = options.unwrap_or(self.batch);
        options.validate()?;
        if let Some(position) = texts.iter().position(|text| text.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(format!(
                "cannot embed empty text at index {position}"
            )));
        }
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let started = Instant::now();
        let batches = plan_batches(texts, options.max_batch_size, options.max_tokens_per_batch);
        let batch_count = batches.len();
        let mut output = Vec::with_capacity(texts.len());

        for (batch_index, range) in batches.into_iter().enumerate() {
            if batch_index > 0 && !options.delay_between_batches.is_zero() {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(EmbeddingError::Cancelled),
                    () = tokio::time::sleep(options.delay_between_batches) => {}
                }
            }
            let batch = &texts[range];
            let vectors = match self.embed_with_retry(batch, cancel).await {
                Ok(vectors) => vectors,
                Err(
                    error @ (EmbeddingError::Cancelled
                    | EmbeddingError::BatchMismatch { .. }
                    | EmbeddingError::DimensionMismatch { .. }),
                ) => return Err(error),
                Err(error) if batch.len() > 1 => {
                    tracing::warn!(
                        event = "embedding.batch.item_fallback",
                        batch_index,
                        batch_size = batch.len(),
                        estimated_tokens = batch.iter().map(|t| estimate_tokens(t)).sum::<usize>(),
                        error = %error,
                        "batch failed; embedding items individually"
                    );
                    self.embed_items_individually(batch, cancel).await?
                }
                Err(error) => return Err(error),
            };
            output.extend(vectors);
        }

        if output.len() != texts.len() {
            return Err(EmbeddingError::BatchMismatch {
                expected: texts.len(),
                actual: output.len(),
            });
        }
        tracing::debug!(
            event = "embedding.batch.completed",
            text_count = texts.len(),
            batch_count,
            elapsed_ms = started.elapsed().as_millis(),
            "batch embedding completed"
        );
        Ok(output)
    }

    // Sequential: the provider's rate limits are unknown here.
    async fn embed_items_individually(
        &self,
        batch: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(batch.len());
        for text in batch {
            vectors.push(self.generate_embedding(text, cancel).await?);
        }
        Ok(vectors)
    }

    async fn embed_with_retry(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let transport = Arc::clone(&self.transport);
        let vectors = retry_with_backoff(self.retry, cancel, "embed", || {
            let transport = Arc::clone(&transport);
            async move { transport.embed(texts).await }
        })
        .await?;
        self.check_shape(texts.len(), &vectors)?;
        Ok(vectors)
    }

    fn check_shape(&self, expected: usize, vectors: &[Vec<f32>]) -> Result<(), EmbeddingError> {
        if vectors.len() != expected {
            return Err(EmbeddingError::BatchMismatch {
                expected,
                actual: vectors.len(),
            });
        }
        if let Some(dimension) = self.dimension
            && let Some(bad) = vectors.iter().find(|v| v.len() != dimension)
        {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }
        Ok(())
    }
}
