//! Greedy batch planning under a count limit and a token budget.

use std::ops::Range;

/// Rough token estimate: `ceil(chars / 4)`.
#[inline]
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Split `texts` into contiguous batches.
///
/// Texts are added to the current batch until either the count limit or the
/// token budget would be exceeded, then the batch is closed. A single text
/// larger than the whole budget still gets a batch of its own; the provider
/// decides whether it fits.
///
/// Ranges are returned in input order and cover every index exactly once.
#[must_use]
pub fn plan_batches(texts: &[String], max_batch_size: usize, max_tokens: usize) -> Vec<Range<usize>> {
    let max_batch_size = max_batch_size.max(1);
    let mut batches = Vec::new();
    let mut start = 0;
    let mut tokens = 0;

    for (index, text) in texts.iter().enumerate() {
        let cost = estimate_tokens(text);
        let count = index - start;
        if count > 0 && (count + 1 > max_batch_size || tokens + cost > max_tokens) {
            batches.push(start..index);
            start = index;
            tokens = 0;
        }
        tokens += cost;
    }
    if start < texts.len() {
        batches.push(start..texts.len());
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::{estimate_tokens, plan_batches};

    fn texts(lens: &[usize]) -> Vec<String> {
        lens.iter().map(|&n| "a".repeat(n)).collect()
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        // chars, not bytes
        assert_eq!(estimate_tokens("äöüß"), 1);
    }

    #[test]
    fn test_count_limit_closes_batches() {
        let batches = plan_batches(&texts(&[4, 4, 4, 4, 4]), 2, 1_000);
        assert_eq!(batches, vec![0..2, 2..4, 4..5]);
    }

    #[test]
    fn test_token_budget_closes_batches() {
        // 10 tokens each, budget 25 -> two per batch
        let batches = plan_batches(&texts(&[40, 40, 40, 40]), 100, 25);
        assert_eq!(batches, vec![0..2, 2..4]);
    }

    #[test]
    fn test_oversized_text_gets_own_batch() {
        let batches = plan_batches(&texts(&[4, 400, 4]), 100, 10);
        assert_eq!(batches, vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn test_batches_cover_input_in_order() {
        let input = texts(&[3, 17, 9, 120, 1, 44, 8, 8, 8, 61]);
        let batches = plan_batches(&input, 3, 20);
        let flattened: Vec<usize> = batches.iter().flat_map(Clone::clone).collect();
        assert_eq!(flattened, (0..input.len()).collect::<Vec<_>>());
        assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= 3));
    }

    #[test]
    fn test_empty_input_has_no_batches() {
        assert!(plan_batches(&[], 10, 10).is_empty());
    }
}
