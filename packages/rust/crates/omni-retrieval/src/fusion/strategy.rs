//! Choose between RRF and weighted fusion for one query.

use serde::Serialize;

use crate::config::HybridConfig;
use crate::types::TextHit;

/// Which policy branch picked the fusion mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionReason {
    /// Caller turned RRF off
    RrfPreferenceDisabled,
    /// Every text hit is a token-fallback or unclassified match
    OnlyTokenFallbackMatches,
    /// Text matcher returned nothing
    NoTextResults,
    /// Too few text hits for a reliable rank
    SparseTextResults,
    /// Both lists are usable rankings
    BalancedRrf,
}

/// Fusion mode and weights for one query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FusionStrategy {
    /// RRF when true, weighted fusion otherwise
    pub use_rrf: bool,
    /// Vector share
    pub vector_weight: f64,
    /// Text share
    pub text_weight: f64,
    /// Branch that fired
    pub reason: FusionReason,
}

/// Decide the fusion mode, first matching branch wins:
///
/// 1. RRF not preferred: weighted, `vector_only_weight / text_only_weight`.
/// 2. Text hits exist but none is exact or variant: weighted, fallback
///    weights (vector-dominant).
/// 3. No text hits: weighted, `1.0 / 0.0`.
/// 4. Fewer than `min_text_results_for_rrf` hits: weighted, fallback weights.
/// 5. Otherwise RRF with balanced weights.
#[must_use]
pub fn determine_fusion_strategy(
    text_results: &[TextHit],
    prefer_rrf: bool,
    config: &HybridConfig,
) -> FusionStrategy {
    let weighted = |vector_weight, text_weight, reason| FusionStrategy {
        use_rrf: false,
        vector_weight,
        text_weight,
        reason,
    };

    if !prefer_rrf {
        return weighted(
            config.vector_only_weight,
            config.text_only_weight,
            FusionReason::RrfPreferenceDisabled,
        );
    }
    if !text_results.is_empty() && !text_results.iter().any(|hit| hit.match_type.is_reliable()) {
        return weighted(
            config.fallback_vector_weight,
            config.fallback_text_weight,
            FusionReason::OnlyTokenFallbackMatches,
        );
    }
    if text_results.is_empty() {
        return weighted(1.0, 0.0, FusionReason::NoTextResults);
    }
    if text_results.len() < config.min_text_results_for_rrf {
        return weighted(
            config.fallback_vector_weight,
            config.fallback_text_weight,
            FusionReason::SparseTextResults,
        );
    }
    FusionStrategy {
        use_rrf: true,
        vector_weight: config.balanced_vector_weight,
        text_weight: config.balanced_text_weight,
        reason: FusionReason::BalancedRrf,
    }
}

#[cfg(test)]
mod tests {
    use super::{FusionReason, determine_fusion_strategy};
    use crate::config::HybridConfig;
    use crate::types::{MatchType, Payload, ResultId, TextHit};

    fn hits(types: &[MatchType]) -> Vec<TextHit> {
        types
            .iter()
            .enumerate()
            .map(|(i, match_type)| TextHit {
                id: ResultId::Int(i as u64),
                score: 0.5,
                payload: Payload::new(),
                match_type: *match_type,
            })
            .collect()
    }

    #[test]
    fn test_branch_order() {
        let config = HybridConfig::default();
        let cases = [
            (hits(&[MatchType::Exact, MatchType::Exact]), false, FusionReason::RrfPreferenceDisabled),
            (hits(&[MatchType::TokenFallback, MatchType::TokenFallback]), true, FusionReason::OnlyTokenFallbackMatches),
            (hits(&[]), true, FusionReason::NoTextResults),
            (hits(&[MatchType::Exact]), true, FusionReason::SparseTextResults),
            (hits(&[MatchType::Variant, MatchType::TokenFallback]), true, FusionReason::BalancedRrf),
        ];
        for (text, prefer, expected) in cases {
            let strategy = determine_fusion_strategy(&text, prefer, &config);
            assert_eq!(strategy.reason, expected);
            assert_eq!(strategy.use_rrf, expected == FusionReason::BalancedRrf);
        }
    }

    #[test]
    fn test_empty_text_is_vector_only() {
        let strategy = determine_fusion_strategy(&[], true, &HybridConfig::default());
        assert!(!strategy.use_rrf);
        assert!((strategy.vector_weight - 1.0).abs() < f64::EPSILON);
        assert!(strategy.text_weight.abs() < f64::EPSILON);
    }
}
