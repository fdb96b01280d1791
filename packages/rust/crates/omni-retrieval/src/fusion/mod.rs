//! Fusion - merge a vector list and a text list into one ranking.
//!
//! Layout: `kernels` (RRF term, weight normalization), `rrf`, `weighted`,
//! `strategy` (RRF vs weighted policy), `gate` (quality gate, dynamic
//! threshold).

mod gate;
mod kernels;
mod rrf;
mod strategy;
mod weighted;

use std::collections::HashMap;

pub use gate::{apply_quality_gate, calculate_dynamic_threshold};
pub use kernels::{normalize_weights, rrf_term};
pub use rrf::fuse_rrf;
pub use strategy::{FusionReason, FusionStrategy, determine_fusion_strategy};
pub use weighted::fuse_weighted;

use crate::error::{Result, RetrievalError};
use crate::types::{
    MatchType, Payload, Provenance, ResultId, ScoreKind, ScoredResult, TextHit, VectorHit,
};

/// Per-id accumulator for one fusion call.
///
/// Ranks are 0-based positions among the distinct ids of each list.
struct FusionEntry<'a> {
    id: &'a ResultId,
    vector: Option<(usize, &'a VectorHit)>,
    text: Option<(usize, &'a TextHit)>,
}

impl FusionEntry<'_> {
    fn provenance(&self) -> Provenance {
        match (self.vector, self.text) {
            (Some((_, v)), Some((_, t))) => Provenance::Hybrid {
                vector_score: v.score,
                text_score: t.score,
                match_type: t.match_type,
            },
            (None, Some((_, t))) => Provenance::TextOnly {
                text_score: t.score,
                match_type: t.match_type,
            },
            (Some((_, v)), None) => Provenance::VectorOnly {
                vector_score: v.score,
            },
            (None, None) => Provenance::TextOnly {
                text_score: 0.0,
                match_type: MatchType::None,
            },
        }
    }

    /// Vector payload, with keys only the text payload has filled in.
    fn payload(&self) -> Payload {
        match (self.vector, self.text) {
            (Some((_, v)), Some((_, t))) => {
                let mut merged = v.payload.clone();
                for (key, value) in &t.payload {
                    if !merged.contains_key(key) {
                        merged.insert(key.clone(), value.clone());
                    }
                }
                merged
            }
            (Some((_, v)), None) => v.payload.clone(),
            (None, Some((_, t))) => t.payload.clone(),
            (None, None) => Payload::new(),
        }
    }

    fn into_result(self, score: f64, score_kind: ScoreKind) -> ScoredResult {
        ScoredResult {
            id: self.id.clone(),
            score,
            score_kind,
            payload: self.payload(),
            provenance: self.provenance(),
            context: None,
        }
    }
}

/// Collect entries in first-insertion order: vector ids, then text-only ids.
///
/// A repeated id inside one list keeps its first (best-ranked) occurrence.
fn collect_entries<'a>(
    vector_results: &'a [VectorHit],
    text_results: &'a [TextHit],
) -> Result<Vec<FusionEntry<'a>>> {
    let mut entries: Vec<FusionEntry<'a>> = Vec::new();
    let mut index: HashMap<&'a ResultId, usize> = HashMap::new();

    let mut rank = 0;
    for hit in vector_results {
        check_score("vector", &hit.id, hit.score)?;
        if index.contains_key(&hit.id) {
            continue;
        }
        index.insert(&hit.id, entries.len());
        entries.push(FusionEntry {
            id: &hit.id,
            vector: Some((rank, hit)),
            text: None,
        });
        rank += 1;
    }

    let mut rank = 0;
    for hit in text_results {
        check_score("text", &hit.id, hit.score)?;
        match index.get(&hit.id) {
            Some(&position) => {
                let entry = &mut entries[position];
                if entry.text.is_some() {
                    continue;
                }
                entry.text = Some((rank, hit));
            }
            None => {
                index.insert(&hit.id, entries.len());
                entries.push(FusionEntry {
                    id: &hit.id,
                    vector: None,
                    text: Some((rank, hit)),
                });
            }
        }
        rank += 1;
    }
    Ok(entries)
}

fn check_score(source: &str, id: &ResultId, score: f64) -> Result<()> {
    if score.is_finite() {
        Ok(())
    } else {
        Err(RetrievalError::invalid(format!(
            "{source} result {id} has non-finite score {score}"
        )))
    }
}

/// Stable descending sort, then truncate.
fn rank_and_truncate(mut results: Vec<ScoredResult>, limit: usize) -> Vec<ScoredResult> {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(limit);
    results
}
