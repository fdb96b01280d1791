//! Provider transports: the wire seam under [`EmbeddingService`](crate::EmbeddingService).
//!
//! [`HttpEmbeddingTransport`] speaks the OpenAI-compatible embeddings API:
//! `POST {model, input: [..]}` with bearer auth, answered by
//! `{data: [{embedding: [..], index?}, ..]}`.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{EmbeddingConfig, EmbeddingError};

/// One provider round-trip for a batch of texts.
///
/// Implementations return exactly one vector per input, in input order, or an
/// error classified for the retry policy. They never retry themselves.
#[async_trait]
pub trait EmbeddingTransport: Send + Sync {
    /// Embed `texts` in a single provider call.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// HTTP transport for OpenAI-compatible embedding endpoints.
pub struct HttpEmbeddingTransport {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbeddingTransport {
    /// Build a transport from provider settings.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::InvalidInput`] if the settings are invalid or
    /// the HTTP client cannot be constructed.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|error| EmbeddingError::InvalidInput(format!("http client: {error}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim().to_string(),
            model: config.model.clone(),
            api_key: config.resolve_api_key(),
        })
    }
}

#[async_trait]
impl EmbeddingTransport for HttpEmbeddingTransport {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let started = Instant::now();
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(error) => {
                tracing::debug!(
                    event = "embedding.http.request_failed",
                    url = %self.endpoint,
                    batch_size = texts.len(),
                    elapsed_ms = started.elapsed().as_millis(),
                    error = %error,
                    "embedding http request failed"
                );
                return Err(error.into());
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let error = EmbeddingError::from_status(status.as_u16(), &text);
            tracing::debug!(
                event = "embedding.http.non_success_status",
                status = %status,
                batch_size = texts.len(),
                kind = error.kind(),
                elapsed_ms = started.elapsed().as_millis(),
                "embedding http returned non-success status"
            );
            return Err(error);
        }

        let data: EmbeddingResponse = resp.json().await.map_err(|error| {
            tracing::debug!(
                event = "embedding.http.decode_failed",
                elapsed_ms = started.elapsed().as_millis(),
                error = %error,
                "embedding http response decode failed"
            );
            EmbeddingError::MalformedResponse(error.to_string())
        })?;

        let vectors = order_by_index(data.data)?;
        tracing::debug!(
            event = "embedding.http.completed",
            batch_size = texts.len(),
            vector_count = vectors.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "embedding http call completed"
        );
        Ok(vectors)
    }
}

/// Respect `index` when every item carries one; otherwise keep body order.
fn order_by_index(mut items: Vec<EmbeddingItem>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if items.iter().all(|item| item.index.is_some()) {
        items.sort_by_key(|item| item.index);
        let contiguous = items
            .iter()
            .enumerate()
            .all(|(position, item)| item.index == Some(position));
        if !contiguous {
            return Err(EmbeddingError::MalformedResponse(
                "embedding indices are not a contiguous 0..n range".to_string(),
            ));
        }
    }
    Ok(items.into_iter().map(|item| item.embedding).collect())
}
