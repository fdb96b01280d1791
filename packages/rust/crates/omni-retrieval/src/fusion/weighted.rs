//! Weighted linear fusion of raw source scores.

use crate::error::Result;
use crate::types::{ScoreKind, ScoredResult, TextHit, VectorHit};

use super::kernels::normalize_weights;
use super::{collect_entries, rank_and_truncate};

/// Fuse by score: `vector_score * w_v + text_score * w_t` with weights
/// normalized to sum to 1.
///
/// Used when text matches are too sparse or too noisy to rank-fuse. No
/// confidence weighting is applied.
///
/// # Errors
///
/// Returns [`crate::RetrievalError::InvalidInput`] for invalid weights or a
/// non-finite input score.
pub fn fuse_weighted(
    vector_results: &[VectorHit],
    text_results: &[TextHit],
    vector_weight: f64,
    text_weight: f64,
    limit: usize,
) -> Result<Vec<ScoredResult>> {
    let (vector_weight, text_weight) = normalize_weights(vector_weight, text_weight)?;
    let entries = collect_entries(vector_results, text_results)?;

    let fused = entries
        .into_iter()
        .map(|entry| {
            let vector_part = entry.vector.map_or(0.0, |(_, hit)| hit.score * vector_weight);
            let text_part = entry.text.map_or(0.0, |(_, hit)| hit.score * text_weight);
            entry.into_result(vector_part + text_part, ScoreKind::Weighted)
        })
        .collect();

    Ok(rank_and_truncate(fused, limit))
}
