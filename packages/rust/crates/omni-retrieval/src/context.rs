//! Neighbor-chunk context expansion.
//!
//! A center chunk with an integer id and `document_field` / `index_field`
//! payload is expanded by `window` chunks on each side. Neighbor ids are
//! assumed sequential within a document (`id + (neighbor_index -
//! center_index)`); fetched neighbors from another document are discarded.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::backend::VectorStore;
use crate::config::ContextConfig;
use crate::error::{Result, RetrievalError};
use crate::types::{Payload, ResultId, ScoredResult, VectorHit};

/// Merged window around one result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkContext {
    /// Result the window is centered on
    pub center_id: ResultId,
    /// Source document, when the payload names one
    pub document_id: Option<Value>,
    /// Chunks in document order, center included
    pub chunk_ids: Vec<ResultId>,
    /// Merged text of `chunk_ids`
    pub text: String,
}

struct CenterPlan {
    document_id: Value,
    index: u64,
    neighbor_ids: Vec<ResultId>,
}

/// Fetches and merges neighboring chunks from a [`VectorStore`].
pub struct ChunkContextExpander {
    store: Arc<dyn VectorStore>,
    config: ContextConfig,
}

impl ChunkContextExpander {
    /// Expander over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, config: ContextConfig) -> Self {
        Self { store, config }
    }

    /// Context window for one result.
    ///
    /// # Errors
    ///
    /// [`RetrievalError::VectorBackend`] if the lookup fails, or
    /// [`RetrievalError::Cancelled`].
    pub async fn get_chunk_context(
        &self,
        center: &ScoredResult,
        cancel: &CancellationToken,
    ) -> Result<ChunkContext> {
        let Some(plan) = self.plan(center) else {
            return Ok(self.center_only(center));
        };
        let fetched = self.fetch(&plan.neighbor_ids, cancel).await?;
        let by_id: HashMap<&ResultId, &Payload> =
            fetched.iter().map(|hit| (&hit.id, &hit.payload)).collect();
        Ok(self.assemble(center, &plan, &by_id))
    }

    /// Context windows for many results, aligned with `results`.
    ///
    /// Issues one store lookup per distinct document, concurrently.
    ///
    /// # Errors
    ///
    /// [`RetrievalError::VectorBackend`] if any lookup fails, or
    /// [`RetrievalError::Cancelled`].
    pub async fn get_batch_chunk_context(
        &self,
        results: &[ScoredResult],
        cancel: &CancellationToken,
    ) -> Result<Vec<ChunkContext>> {
        let plans: Vec<Option<CenterPlan>> = results.iter().map(|r| self.plan(r)).collect();

        let mut groups: BTreeMap<String, Vec<ResultId>> = BTreeMap::new();
        for plan in plans.iter().flatten() {
            let ids = groups.entry(plan.document_id.to_string()).or_default();
            for id in &plan.neighbor_ids {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }

        let lookups = groups.values().map(|ids| self.fetch(ids, cancel));
        let fetched: Vec<Vec<VectorHit>> = futures::future::try_join_all(lookups).await?;
        tracing::debug!(
            event = "retrieval.context.batch_fetched",
            results = results.len(),
            documents = groups.len(),
            chunks = fetched.iter().map(Vec::len).sum::<usize>(),
            "context neighbors fetched"
        );

        let mut by_id: HashMap<&ResultId, &Payload> = fetched
            .iter()
            .flatten()
            .map(|hit| (&hit.id, &hit.payload))
            .collect();
        for result in results {
            by_id.insert(&result.id, &result.payload);
        }

        Ok(results
            .iter()
            .zip(&plans)
            .map(|(result, plan)| match plan {
                Some(plan) => self.assemble(result, plan, &by_id),
                None => self.center_only(result),
            })
            .collect())
    }

    fn plan(&self, center: &ScoredResult) -> Option<CenterPlan> {
        let id = center.id.as_int()?;
        let document_id = center.payload.get(&self.config.document_field)?.clone();
        let index = center.payload.get(&self.config.index_field)?.as_u64()?;

        let window = u64::try_from(self.config.window).unwrap_or(u64::MAX);
        let first = index.saturating_sub(window);
        let last = index.saturating_add(window);
        let neighbor_ids = (first..=last)
            .filter(|&n| n != index)
            .filter_map(|n| {
                let offset = i64::try_from(n).ok()? - i64::try_from(index).ok()?;
                id.checked_add_signed(offset).map(ResultId::Int)
            })
            .collect();
        Some(CenterPlan {
            document_id,
            index,
            neighbor_ids,
        })
    }

    async fn fetch(&self, ids: &[ResultId], cancel: &CancellationToken) -> Result<Vec<VectorHit>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RetrievalError::Cancelled),
            fetched = self.store.get_by_ids(ids) => fetched.map_err(|error| {
                RetrievalError::VectorBackend(format!("context lookup failed: {error:#}"))
            }),
        }
    }

    fn assemble(
        &self,
        center: &ScoredResult,
        plan: &CenterPlan,
        by_id: &HashMap<&ResultId, &Payload>,
    ) -> ChunkContext {
        let mut chunks: Vec<(u64, ResultId, &str)> =
            vec![(plan.index, center.id.clone(), self.text_of(&center.payload))];
        for id in &plan.neighbor_ids {
            let Some(payload) = by_id.get(id) else {
                continue;
            };
            if payload.get(&self.config.document_field) != Some(&plan.document_id) {
                continue;
            }
            let Some(index) = payload.get(&self.config.index_field).and_then(Value::as_u64) else {
                continue;
            };
            chunks.push((index, id.clone(), self.text_of(payload)));
        }
        chunks.sort_by_key(|(index, _, _)| *index);
        chunks.dedup_by_key(|(index, _, _)| *index);

        let texts: Vec<&str> = chunks.iter().map(|(_, _, text)| *text).collect();
        ChunkContext {
            center_id: center.id.clone(),
            document_id: Some(plan.document_id.clone()),
            text: merge_context_text(&texts, self.config.min_overlap_words),
            chunk_ids: chunks.into_iter().map(|(_, id, _)| id).collect(),
        }
    }

    fn center_only(&self, center: &ScoredResult) -> ChunkContext {
        ChunkContext {
            center_id: center.id.clone(),
            document_id: center.payload.get(&self.config.document_field).cloned(),
            chunk_ids: vec![center.id.clone()],
            text: self.text_of(&center.payload).trim().to_string(),
        }
    }

    fn text_of<'p>(&self, payload: &'p Payload) -> &'p str {
        payload
            .get(&self.config.text_field)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// Concatenate chunks in order, trimming a repeated word overlap of at least
/// `min_overlap_words` between neighbors. Chunks without overlap are joined
/// as paragraphs.
#[must_use]
pub fn merge_context_text(chunks: &[&str], min_overlap_words: usize) -> String {
    let mut merged = String::new();
    let mut previous: Option<&str> = None;
    for chunk in chunks.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
        match previous {
            None => merged.push_str(chunk),
            Some(previous) => {
                let skip = overlap_end(previous, chunk, min_overlap_words.max(1));
                let rest = chunk[skip..].trim_start();
                if !rest.is_empty() {
                    merged.push_str(if skip > 0 { " " } else { "\n\n" });
                    merged.push_str(rest);
                }
            }
        }
        previous = Some(chunk);
    }
    merged
}

/// Byte offset in `next` just past the longest word run that ends `previous`
/// and starts `next`, or 0 if shorter than `min_words`.
fn overlap_end(previous: &str, next: &str, min_words: usize) -> usize {
    let tail = word_spans(previous);
    let head = word_spans(next);
    let longest = tail.len().min(head.len());
    (min_words..=longest)
        .rev()
        .find(|&n| {
            tail[tail.len() - n..]
                .iter()
                .zip(&head[..n])
                .all(|(&(a0, a1), &(b0, b1))| previous[a0..a1] == next[b0..b1])
        })
        .map_or(0, |n| head[n - 1].1)
}

fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}
