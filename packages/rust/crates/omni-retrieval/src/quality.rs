//! Chunk quality scoring, quality filter and quality boost.
//!
//! A chunk's quality is a weighted mean of four pure sub-scores over its text
//! and payload metadata, each in `[0, 1]`:
//!
//! | Sub-score | Signal |
//! |-----------|--------|
//! | readability | average words per sentence near 8–25, times alphabetic share |
//! | completeness | clean start, terminal punctuation, enough words |
//! | structure | paragraphs, headings, list items, title metadata |
//! | density | distinct content words per word |
//!
//! A stored `quality_score` / `qualityScore` payload field wins over the
//! computed value.

use std::collections::HashSet;

use serde::Serialize;

use crate::config::QualityConfig;
use crate::lexicon;
use crate::types::{Payload, ScoreKind, ScoredResult};

const TEXT_FIELDS: [&str; 2] = ["text", "content"];
const STORED_QUALITY_FIELDS: [&str; 2] = ["quality_score", "qualityScore"];
const TITLE_FIELDS: [&str; 3] = ["title", "heading", "section"];

const IDEAL_SENTENCE_WORDS_MIN: f64 = 8.0;
const IDEAL_SENTENCE_WORDS_MAX: f64 = 25.0;

/// Sub-scores and weighted total for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityBreakdown {
    /// Sentence length and alphabetic share
    pub readability: f64,
    /// Clean start, clean end, enough words
    pub completeness: f64,
    /// Layout signals
    pub structure: f64,
    /// Lexical density
    pub density: f64,
    /// Weighted mean of the four
    pub total: f64,
}

/// Scores chunks and applies quality-based filtering and boosting.
#[derive(Debug, Clone, Default)]
pub struct QualityScorer {
    config: QualityConfig,
}

impl QualityScorer {
    /// Scorer over validated settings.
    #[must_use]
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Active settings.
    #[must_use]
    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// All sub-scores for a chunk payload (text read from `text` or `content`).
    #[must_use]
    pub fn breakdown(&self, chunk: &Payload) -> QualityBreakdown {
        let text = chunk_text(chunk).unwrap_or_default();
        let readability = readability(text);
        let completeness = completeness(text, self.config.min_complete_words);
        let structure = structure(text, chunk);
        let density = density(text);

        let w = self.config.weights;
        let total_weight = w.total();
        let total = if total_weight > 0.0 {
            (readability * w.readability
                + completeness * w.completeness
                + structure * w.structure
                + density * w.density)
                / total_weight
        } else {
            0.0
        };
        QualityBreakdown {
            readability,
            completeness,
            structure,
            density,
            total: total.clamp(0.0, 1.0),
        }
    }

    /// Computed quality of a chunk payload in `[0, 1]`.
    #[must_use]
    pub fn calculate_chunk_quality(&self, chunk: &Payload) -> f64 {
        self.breakdown(chunk).total
    }

    /// Stored quality if the payload has one, else computed.
    #[must_use]
    pub fn quality_of(&self, result: &ScoredResult) -> f64 {
        STORED_QUALITY_FIELDS
            .iter()
            .find_map(|field| result.payload.get(*field).and_then(serde_json::Value::as_f64))
            .filter(|q| q.is_finite())
            .map_or_else(
                || self.calculate_chunk_quality(&result.payload),
                |q| q.clamp(0.0, 1.0),
            )
    }

    /// Multiply each score by `1 + (quality - 0.5) * (boost_factor - 1)`,
    /// relabel it `quality_adjusted`, and re-sort (stable) descending.
    #[must_use]
    pub fn apply_quality_boost(
        &self,
        mut results: Vec<ScoredResult>,
        boost_factor: f64,
    ) -> Vec<ScoredResult> {
        for result in &mut results {
            let quality = self.quality_of(result);
            result.score *= 1.0 + (quality - 0.5) * (boost_factor - 1.0);
            result.score_kind = ScoreKind::QualityAdjusted;
        }
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results
    }

    /// Drop results below `min_quality`, when the quality filter is enabled.
    #[must_use]
    pub fn filter_by_quality(
        &self,
        results: Vec<ScoredResult>,
        min_quality: f64,
    ) -> Vec<ScoredResult> {
        if !self.config.retrieval.enable_quality_filter {
            return results;
        }
        results
            .into_iter()
            .filter(|result| self.quality_of(result) >= min_quality)
            .collect()
    }
}

fn chunk_text(chunk: &Payload) -> Option<&str> {
    TEXT_FIELDS
        .iter()
        .find_map(|field| chunk.get(*field).and_then(serde_json::Value::as_str))
}

fn count(n: usize) -> f64 {
    f64::from(u32::try_from(n).unwrap_or(u32::MAX))
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        count(part) / count(whole)
    }
}

fn readability(text: &str) -> f64 {
    let sentence_lengths: Vec<usize> = text
        .split(['.', '!', '?', '\n'])
        .map(|sentence| sentence.split_whitespace().count())
        .filter(|&words| words > 0)
        .collect();
    if sentence_lengths.is_empty() {
        return 0.0;
    }
    let average = count(sentence_lengths.iter().sum()) / count(sentence_lengths.len());
    let length_score = if average < IDEAL_SENTENCE_WORDS_MIN {
        average / IDEAL_SENTENCE_WORDS_MIN
    } else if average <= IDEAL_SENTENCE_WORDS_MAX {
        1.0
    } else {
        (1.0 - (average - IDEAL_SENTENCE_WORDS_MAX) / IDEAL_SENTENCE_WORDS_MAX).max(0.0)
    };

    let visible: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    let alphabetic = visible.iter().filter(|c| c.is_alphabetic()).count();
    (length_score * ratio(alphabetic, visible.len())).clamp(0.0, 1.0)
}

fn completeness(text: &str, min_words: usize) -> f64 {
    let trimmed = text.trim();
    let (Some(first), Some(last)) = (trimmed.chars().next(), trimmed.chars().last()) else {
        return 0.0;
    };
    let clean_start = first.is_uppercase()
        || first.is_ascii_digit()
        || matches!(first, '-' | '*' | '•' | '#' | '>' | '(' | '"' | '„' | '«');
    let clean_end = matches!(
        last,
        '.' | '!' | '?' | ':' | ';' | '"' | '\'' | ')' | '»' | '“' | '”'
    );
    let words = trimmed.split_whitespace().count();
    let length = if min_words == 0 {
        1.0
    } else {
        ratio(words, min_words).min(1.0)
    };
    (f64::from(u8::from(clean_start)) + f64::from(u8::from(clean_end)) + length) / 3.0
}

fn structure(text: &str, metadata: &Payload) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let lines: Vec<&str> = trimmed.lines().map(str::trim).collect();
    let mut score = 0.2;
    if trimmed.contains("\n\n") {
        score += 0.25;
    }
    if lines
        .iter()
        .any(|line| line.starts_with('#') || (line.ends_with(':') && line.split_whitespace().count() <= 8))
    {
        score += 0.2;
    }
    if lines.iter().any(|line| is_list_item(line)) {
        score += 0.15;
    }
    let has_title = TITLE_FIELDS.iter().any(|field| {
        metadata
            .get(*field)
            .and_then(serde_json::Value::as_str)
            .is_some_and(|value| !value.trim().is_empty())
    });
    if has_title {
        score += 0.2;
    }
    f64::min(score, 1.0)
}

fn is_list_item(line: &str) -> bool {
    if ["- ", "* ", "• "].iter().any(|marker| line.starts_with(marker)) {
        return true;
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    digits > 0
        && line[digits..].starts_with(['.', ')'])
        && line[digits + 1..].starts_with(' ')
}

fn density(text: &str) -> f64 {
    let words: Vec<String> = lexicon::tokens(text).collect();
    let content: HashSet<&str> = words
        .iter()
        .map(String::as_str)
        .filter(|word| word.chars().count() >= 3 && !lexicon::is_stopword(word))
        .collect();
    ratio(content.len(), words.len()).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::{Provenance, ResultId};

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    fn scored(id: u64, score: f64, payload: Payload) -> ScoredResult {
        ScoredResult {
            id: ResultId::Int(id),
            score,
            score_kind: ScoreKind::Rrf,
            payload,
            provenance: Provenance::VectorOnly { vector_score: 0.8 },
            context: None,
        }
    }

    #[test]
    fn test_well_formed_chunk_beats_fragment() {
        let scorer = QualityScorer::default();
        let good = payload(json!({
            "title": "Klimaschutzgesetz",
            "text": "# Ziele\n\nDas Gesetz legt verbindliche Ziele zur Minderung der Treibhausgasemissionen fest. \
                     Bis zum Jahr 2045 soll Deutschland klimaneutral sein.\n\n- Sektorziele\n- Jahresemissionsmengen"
        }));
        let fragment = payload(json!({"text": "und dann 12 34 ## || ..."}));
        let good_q = scorer.calculate_chunk_quality(&good);
        let fragment_q = scorer.calculate_chunk_quality(&fragment);
        assert!(good_q > fragment_q, "{good_q} <= {fragment_q}");
        assert!((0.0..=1.0).contains(&good_q));
    }

    #[test]
    fn test_breakdown_sub_scores() {
        let scorer = QualityScorer::default();
        let breakdown = scorer.breakdown(&payload(json!({
            "content": "Solar panels convert sunlight into electricity for homes and businesses."
        })));
        // one 10-word sentence, letters only apart from the period
        assert!(breakdown.readability > 0.95);
        assert!((breakdown.completeness - 1.0 + (1.0 - 10.0 / 12.0) / 3.0).abs() < 1e-9);
        assert!((breakdown.structure - 0.2).abs() < 1e-9);
        assert!(breakdown.density > 0.6);
    }

    #[test]
    fn test_empty_chunk_scores_zero() {
        let scorer = QualityScorer::default();
        assert!(scorer.calculate_chunk_quality(&Payload::new()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_boost_multipliers() {
        let scorer = QualityScorer::default();
        let boosted = scorer.apply_quality_boost(
            vec![
                scored(1, 0.5, payload(json!({"quality_score": 0.0}))),
                scored(2, 0.5, payload(json!({"qualityScore": 1.0}))),
                scored(3, 0.5, payload(json!({"quality_score": 0.5}))),
            ],
            1.2,
        );
        let ids: Vec<_> = boosted.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![ResultId::Int(2), ResultId::Int(3), ResultId::Int(1)]);
        assert!((boosted[0].score - 0.55).abs() < 1e-12);
        assert!((boosted[1].score - 0.5).abs() < 1e-12);
        assert!((boosted[2].score - 0.45).abs() < 1e-12);
        assert!(boosted.iter().all(|r| r.score_kind == ScoreKind::QualityAdjusted));
    }

    #[test]
    fn test_filter_respects_enable_flag() {
        let results = vec![
            scored(1, 0.5, payload(json!({"quality_score": 0.1}))),
            scored(2, 0.5, payload(json!({"quality_score": 0.9}))),
        ];
        let disabled = QualityScorer::default();
        assert_eq!(disabled.filter_by_quality(results.clone(), 0.3).len(), 2);

        let mut config = QualityConfig::default();
        config.retrieval.enable_quality_filter = true;
        let enabled = QualityScorer::new(config);
        let kept = enabled.filter_by_quality(results, 0.3);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, ResultId::Int(2));
    }

    #[test]
    fn test_numbered_list_items() {
        assert!(is_list_item("1. Schritt"));
        assert!(is_list_item("12) step"));
        assert!(!is_list_item("2045 soll"));
        assert!(!is_list_item("3."));
    }
}
