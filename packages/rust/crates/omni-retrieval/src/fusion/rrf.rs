//! Reciprocal Rank Fusion with optional confidence weighting.

use crate::config::HybridConfig;
use crate::error::{Result, RetrievalError};
use crate::types::{ScoreKind, ScoredResult, TextHit, VectorHit};

use super::kernels::rrf_term;
use super::{collect_entries, rank_and_truncate};

/// Fuse by rank: each list contributes `1 / (k + rank)` per id.
///
/// Ids in both lists sum both terms and become `hybrid`. With
/// `config.enable_confidence_weighting`, hybrid ids are multiplied by
/// `confidence_boost` and vector-only ids by `confidence_penalty`; text-only
/// ids keep `1.0`. Output is sorted descending (ties keep insertion order)
/// and truncated to `limit`.
///
/// # Errors
///
/// Returns [`RetrievalError::InvalidInput`] for a non-positive `k` or a
/// non-finite input score.
pub fn fuse_rrf(
    vector_results: &[VectorHit],
    text_results: &[TextHit],
    limit: usize,
    k: f64,
    config: &HybridConfig,
) -> Result<Vec<ScoredResult>> {
    if !(k.is_finite() && k > 0.0) {
        return Err(RetrievalError::invalid(format!(
            "rrf k must be positive, got {k}"
        )));
    }
    let entries = collect_entries(vector_results, text_results)?;

    let fused = entries
        .into_iter()
        .map(|entry| {
            let vector_term = entry.vector.map_or(0.0, |(rank, _)| rrf_term(k, rank));
            let text_term = entry.text.map_or(0.0, |(rank, _)| rrf_term(k, rank));
            let confidence = if config.enable_confidence_weighting {
                match (entry.vector.is_some(), entry.text.is_some()) {
                    (true, true) => config.confidence_boost,
                    (true, false) => config.confidence_penalty,
                    _ => 1.0,
                }
            } else {
                1.0
            };
            let score = (vector_term + text_term) * confidence;
            entry.into_result(score, ScoreKind::Rrf)
        })
        .collect();

    Ok(rank_and_truncate(fused, limit))
}
