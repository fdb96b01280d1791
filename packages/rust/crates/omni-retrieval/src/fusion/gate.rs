//! Post-fusion quality gate and the dynamic similarity threshold.

use crate::config::HybridConfig;
use crate::types::{ScoredResult, SearchMethod};

/// Drop results below `min_final_score`; without text matches, also drop
/// vector-only results below `min_vector_only_final_score`.
///
/// No-op when `config.enable_quality_gate` is false.
#[must_use]
pub fn apply_quality_gate(
    results: Vec<ScoredResult>,
    has_text_matches: bool,
    config: &HybridConfig,
) -> Vec<ScoredResult> {
    if !config.enable_quality_gate {
        return results;
    }
    let before = results.len();
    let kept: Vec<ScoredResult> = results
        .into_iter()
        .filter(|result| {
            if result.score < config.min_final_score {
                return false;
            }
            has_text_matches
                || result.search_method() != SearchMethod::Vector
                || result.score >= config.min_vector_only_final_score
        })
        .collect();
    if kept.len() < before {
        tracing::debug!(
            event = "retrieval.fusion.quality_gate",
            dropped = before - kept.len(),
            kept = kept.len(),
            has_text_matches,
            "quality gate dropped results"
        );
    }
    kept
}

/// Effective similarity floor: `base` raised (never lowered) to the floor for
/// the text-match situation.
#[must_use]
pub fn calculate_dynamic_threshold(base: f64, has_text_matches: bool, config: &HybridConfig) -> f64 {
    if !config.enable_dynamic_threshold {
        return base;
    }
    let floor = if has_text_matches {
        config.min_vector_with_text_threshold
    } else {
        config.min_vector_only_threshold
    };
    base.max(floor)
}

#[cfg(test)]
mod tests {
    use super::{apply_quality_gate, calculate_dynamic_threshold};
    use crate::config::HybridConfig;
    use crate::types::{MatchType, Payload, Provenance, ResultId, ScoreKind, ScoredResult};

    fn result(id: u64, score: f64, provenance: Provenance) -> ScoredResult {
        ScoredResult {
            id: ResultId::Int(id),
            score,
            score_kind: ScoreKind::Weighted,
            payload: Payload::new(),
            provenance,
            context: None,
        }
    }

    #[test]
    fn test_threshold_never_lowers() {
        let config = HybridConfig::default();
        assert!(calculate_dynamic_threshold(0.5, false, &config) >= config.min_vector_only_threshold);
        assert!(
            calculate_dynamic_threshold(0.5, true, &config) >= config.min_vector_with_text_threshold
        );
        assert!((calculate_dynamic_threshold(0.9, true, &config) - 0.9).abs() < f64::EPSILON);
        assert!((calculate_dynamic_threshold(0.0, true, &config) - 0.35).abs() < f64::EPSILON);
    }

    #[test]
    fn test_gate_is_stricter_without_text_matches() {
        let config = HybridConfig::default();
        let results = vec![
            result(1, 0.52, Provenance::VectorOnly { vector_score: 0.52 }),
            result(
                2,
                0.52,
                Provenance::TextOnly {
                    text_score: 0.52,
                    match_type: MatchType::TokenFallback,
                },
            ),
            result(3, 0.001, Provenance::VectorOnly { vector_score: 0.9 }),
        ];
        let strict = apply_quality_gate(results.clone(), false, &config);
        assert_eq!(strict.len(), 1);
        assert_eq!(strict[0].id, ResultId::Int(2));

        let relaxed = apply_quality_gate(results.clone(), true, &config);
        assert_eq!(relaxed.len(), 2);

        let disabled = HybridConfig {
            enable_quality_gate: false,
            ..HybridConfig::default()
        };
        assert_eq!(apply_quality_gate(results, false, &disabled).len(), 3);
    }
}
