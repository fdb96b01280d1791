//! Compute kernels for fusion: RRF term and weight normalization.

use crate::error::{Result, RetrievalError};

/// RRF term for a 0-based rank: `1 / (k + rank + 1)`.
///
/// Equals `1 / (k + r)` for the 1-based rank `r`.
#[inline]
#[must_use]
pub fn rrf_term(k: f64, rank: usize) -> f64 {
    let rank_f64 = f64::from(u32::try_from(rank).unwrap_or(u32::MAX));
    1.0 / (k + rank_f64 + 1.0)
}

/// Normalize a weight pair to sum to 1.
///
/// # Errors
///
/// Returns [`RetrievalError::InvalidInput`] for negative or non-finite
/// weights, or a zero sum.
pub fn normalize_weights(vector_weight: f64, text_weight: f64) -> Result<(f64, f64)> {
    let valid = |w: f64| w.is_finite() && w >= 0.0;
    if !valid(vector_weight) || !valid(text_weight) {
        return Err(RetrievalError::invalid(format!(
            "fusion weights must be finite and non-negative, got {vector_weight}/{text_weight}"
        )));
    }
    let total = vector_weight + text_weight;
    if total <= 0.0 {
        return Err(RetrievalError::invalid("fusion weights must not both be zero"));
    }
    Ok((vector_weight / total, text_weight / total))
}

#[cfg(test)]
mod tests {
    use super::{normalize_weights, rrf_term};

    #[test]
    fn test_rrf_term() {
        assert!((rrf_term(60.0, 0) - (1.0 / 61.0)).abs() < 1e-12);
        assert!((rrf_term(60.0, 1) - (1.0 / 62.0)).abs() < 1e-12);
        assert!((rrf_term(10.0, 2) - (1.0 / 13.0)).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_weights() {
        let (v, t) = normalize_weights(3.0, 1.0).unwrap();
        assert!((v - 0.75).abs() < 1e-12);
        assert!((t - 0.25).abs() < 1e-12);
        assert!(normalize_weights(0.0, 0.0).is_err());
        assert!(normalize_weights(-1.0, 2.0).is_err());
        assert!(normalize_weights(f64::NAN, 1.0).is_err());
    }
}
