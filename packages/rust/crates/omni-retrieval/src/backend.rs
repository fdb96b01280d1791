//! Retrieval backend seams: the vector store and the text matcher.
//!
//! Implementations report failures as `anyhow::Error`; the orchestrator maps
//! them into [`RetrievalError`](crate::RetrievalError) and decides whether to
//! degrade or fail.

use async_trait::async_trait;

use crate::filter::QdrantFilter;
use crate::types::{ResultId, TextHit, VectorHit};

/// Nearest-neighbor request.
#[derive(Debug, Clone, Copy)]
pub struct VectorQuery<'a> {
    /// Query embedding
    pub embedding: &'a [f32],
    /// Maximum hits
    pub limit: usize,
    /// Minimum similarity a hit must reach
    pub score_threshold: f64,
    /// Payload predicate
    pub filter: Option<&'a QdrantFilter>,
    /// Collections to search; empty means all
    pub collections: &'a [String],
}

/// Keyword request.
#[derive(Debug, Clone, Copy)]
pub struct TextQuery<'a> {
    /// Raw query text
    pub query: &'a str,
    /// Maximum hits
    pub limit: usize,
    /// Payload predicate
    pub filter: Option<&'a QdrantFilter>,
    /// Collections to search; empty means all
    pub collections: &'a [String],
}

/// Vector similarity search and point lookup.
///
/// Hit order carries no tie-breaking contract; fusion imposes its own.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Top hits for an embedding, best first.
    async fn query(&self, request: VectorQuery<'_>) -> anyhow::Result<Vec<VectorHit>>;

    /// One point by id; `None` if absent.
    async fn get_by_id(&self, id: &ResultId) -> anyhow::Result<Option<VectorHit>>;

    /// Several points by id; absent ids are skipped.
    ///
    /// The default issues one [`get_by_id`](Self::get_by_id) per id; stores
    /// with a batch lookup should override it.
    async fn get_by_ids(&self, ids: &[ResultId]) -> anyhow::Result<Vec<VectorHit>> {
        let mut hits = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(hit) = self.get_by_id(id).await? {
                hits.push(hit);
            }
        }
        Ok(hits)
    }
}

/// Keyword / phrase search.
#[async_trait]
pub trait TextMatcher: Send + Sync {
    /// Ranked hits, best first, each classified by [`MatchType`](crate::MatchType).
    async fn search(&self, request: TextQuery<'_>) -> anyhow::Result<Vec<TextHit>>;
}
