//! Lexical query understanding: intent type, language, keywords, and the
//! document/collection scope a query addresses.
//!
//! Pure and deterministic. Dictionaries are compiled once into Aho-Corasick
//! automatons (leftmost-longest, matched on the lowercased query, accepted
//! only on word boundaries).

use std::collections::{BTreeMap, HashSet};

use aho_corasick::{AhoCorasick, MatchKind};
use regex::Regex;
use serde::Serialize;

use crate::config::{DocumentEntry, IntentConfig};
use crate::error::{Result, RetrievalError};
use crate::filter::QdrantFilter;
use crate::lexicon;
use crate::types::ScoredResult;

/// What kind of answer a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    /// "was ist", "what is"
    Definition,
    /// "wie kann ich", "how to"
    HowTo,
    /// "unterschied", "difference between"
    Comparison,
    /// "wann", "how many"
    Factual,
    /// "welche", "list of"
    List,
    /// No pattern matched
    General,
}

/// Query language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// German
    De,
    /// English
    En,
    /// Not decidable from the query
    Unknown,
}

/// Boolean query features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentFlags {
    /// Query contains a number
    pub has_numbers: bool,
}

/// Per-request query classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryIntent {
    /// Intent type
    #[serde(rename = "type")]
    pub intent_type: IntentType,
    /// Detected language
    pub language: Language,
    /// Heuristic confidence in `[0.3, 0.95]`
    pub confidence: f64,
    /// Content words in query order
    pub keywords: Vec<String>,
    /// Boolean features
    pub flags: IntentFlags,
}

/// Collections and payload constraints a query addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentScope {
    /// Candidate collections; all available ones when nothing narrowed them
    pub collections: Vec<String>,
    /// Canonical document title to filter on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_title_filter: Option<String>,
    /// Phrase in the query that selected the document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_phrase: Option<String>,
    /// Payload field → required value
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub subcategory_filters: BTreeMap<String, String>,
}

impl DocumentScope {
    /// True when a title or subcategory constrains the search.
    #[must_use]
    pub fn is_scoped(&self) -> bool {
        self.document_title_filter.is_some() || !self.subcategory_filters.is_empty()
    }
}

/// Content types an intent favours or avoids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentPreferences {
    /// Boosted after fusion; never a filter clause
    pub preferred_content_types: Vec<String>,
    /// Become a `must_not` clause
    pub excluded_content_types: Vec<String>,
    /// Numbers in results are likely relevant
    pub prefer_numeric: bool,
}

const TYPE_PATTERNS: &[(IntentType, &[&str])] = &[
    (
        IntentType::Definition,
        &[
            "was ist", "was sind", "was bedeutet", "was versteht man unter", "definition",
            "bedeutung", "what is", "what are", "what does", "define", "meaning of",
        ],
    ),
    (
        IntentType::HowTo,
        &[
            "wie kann", "wie mache", "wie funktioniert", "wie beantrage", "anleitung",
            "schritte", "how to", "how do", "how can", "steps to", "guide",
        ],
    ),
    (
        IntentType::Comparison,
        &[
            "unterschied", "vergleich", "versus", "vs", "im gegensatz", "difference between",
            "compare", "comparison", "better than",
        ],
    ),
    (
        IntentType::Factual,
        &[
            "wann", "wo", "wer", "wie viel", "wie viele", "wie hoch", "how many", "how much",
            "when", "where", "who",
        ],
    ),
    (
        IntentType::List,
        &[
            "liste", "welche", "aufzählung", "beispiele", "list of", "which", "examples of",
            "types of",
        ],
    ),
];

const BASE_CONFIDENCE: f64 = 0.3;
const PATTERN_CONFIDENCE: f64 = 0.25;
const LANGUAGE_CONFIDENCE: f64 = 0.1;
const MAX_CONFIDENCE: f64 = 0.95;

/// Lexical intent and scope detector over a static catalog.
pub struct IntentDetector {
    config: IntentConfig,
    type_matcher: AhoCorasick,
    type_of_pattern: Vec<IntentType>,
    document_matcher: AhoCorasick,
    document_of_pattern: Vec<usize>,
    subcategory_matcher: AhoCorasick,
    number_re: Regex,
    quote_re: Regex,
}

impl IntentDetector {
    /// Compile the dictionaries and the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidInput`] if the catalog is invalid or
    /// cannot be compiled.
    pub fn new(config: IntentConfig) -> Result<Self> {
        config.validate()?;

        let (type_of_pattern, type_patterns): (Vec<IntentType>, Vec<&str>) = TYPE_PATTERNS
            .iter()
            .flat_map(|(kind, patterns)| patterns.iter().map(move |p| (*kind, *p)))
            .unzip();

        let mut document_of_pattern = Vec::new();
        let mut document_patterns = Vec::new();
        for (index, doc) in config.documents.iter().enumerate() {
            for name in std::iter::once(&doc.title).chain(&doc.aliases) {
                let name = name.trim().to_lowercase();
                if !name.is_empty() {
                    document_patterns.push(name);
                    document_of_pattern.push(index);
                }
            }
        }
        let subcategory_patterns: Vec<String> = config
            .subcategories
            .iter()
            .map(|entry| entry.keyword.trim().to_lowercase())
            .collect();

        Ok(Self {
            type_matcher: build_matcher(&type_patterns)?,
            type_of_pattern,
            document_matcher: build_matcher(&document_patterns)?,
            document_of_pattern,
            subcategory_matcher: build_matcher(&subcategory_patterns)?,
            number_re: compile(r"\d+(?:[.,]\d+)?")?,
            quote_re: compile(r#""([^"]+)"|„([^“”"]+)[“”"]|“([^”]+)”|«([^»]+)»"#)?,
            config,
        })
    }

    /// Active catalog.
    #[must_use]
    pub fn config(&self) -> &IntentConfig {
        &self.config
    }

    /// Classify a query.
    #[must_use]
    pub fn detect_intent(&self, query: &str) -> QueryIntent {
        let lower = query.to_lowercase();
        let language = detect_language(&lower);

        let mut counts: Vec<(IntentType, usize)> =
            TYPE_PATTERNS.iter().map(|(kind, _)| (*kind, 0)).collect();
        for found in self.type_matcher.find_iter(&lower) {
            if !is_word_bounded(&lower, found.start(), found.end()) {
                continue;
            }
            let kind = self.type_of_pattern[found.pattern().as_usize()];
            if let Some(slot) = counts.iter_mut().find(|(k, _)| *k == kind) {
                slot.1 += 1;
            }
        }
        // earlier entries win ties
        let (intent_type, matched) = counts
            .iter()
            .fold((IntentType::General, 0), |best, &(kind, n)| {
                if n > best.1 { (kind, n) } else { best }
            });

        let mut confidence = BASE_CONFIDENCE + PATTERN_CONFIDENCE * f64::from(u8::from(matched >= 1))
            + PATTERN_CONFIDENCE * f64::from(u8::from(matched >= 2));
        if language != Language::Unknown {
            confidence += LANGUAGE_CONFIDENCE;
        }

        QueryIntent {
            intent_type,
            language,
            confidence: confidence.min(MAX_CONFIDENCE),
            keywords: extract_keywords(&lower),
            flags: IntentFlags {
                has_numbers: self.number_re.is_match(&lower),
            },
        }
    }

    /// Resolve the document and collections a query addresses.
    ///
    /// Order: a quoted phrase is taken as an explicit title (canonicalized
    /// through the catalog when it names a known document); otherwise the
    /// first catalog title or alias mentioned in the query. Subcategory
    /// keywords add field filters. Each match narrows `available_collections`
    /// unless that would leave none.
    #[must_use]
    pub fn detect_document_scope(
        &self,
        query: &str,
        available_collections: &[String],
    ) -> DocumentScope {
        let lower = query.to_lowercase();
        let mut scope = DocumentScope {
            collections: available_collections.to_vec(),
            ..DocumentScope::default()
        };

        if let Some(phrase) = self.quoted_phrase(query) {
            let phrase_lower = phrase.to_lowercase();
            let known = self
                .document_by_name(&phrase_lower)
                .or_else(|| self.document_mention(&phrase_lower).map(|(doc, _)| doc));
            match known {
                Some(doc) => {
                    scope.document_title_filter = Some(doc.title.clone());
                    narrow(&mut scope.collections, &doc.collections);
                }
                None => scope.document_title_filter = Some(phrase.clone()),
            }
            scope.detected_phrase = Some(phrase);
        } else if let Some((doc, matched)) = self.document_mention(&lower) {
            scope.document_title_filter = Some(doc.title.clone());
            scope.detected_phrase = Some(matched);
            narrow(&mut scope.collections, &doc.collections);
        }

        for found in self.subcategory_matcher.find_iter(&lower) {
            if !is_word_bounded(&lower, found.start(), found.end()) {
                continue;
            }
            let entry = &self.config.subcategories[found.pattern().as_usize()];
            scope
                .subcategory_filters
                .entry(entry.field.clone())
                .or_insert_with(|| entry.value.clone());
            narrow(&mut scope.collections, &entry.collections);
        }

        if scope.is_scoped() {
            tracing::debug!(
                event = "retrieval.intent.scope_detected",
                title = scope.document_title_filter.as_deref().unwrap_or(""),
                subcategories = scope.subcategory_filters.len(),
                collections = scope.collections.len(),
                "query scope detected"
            );
        }
        scope
    }

    /// Content types favoured or avoided for an intent.
    #[must_use]
    pub fn get_content_preferences(&self, intent: &QueryIntent) -> ContentPreferences {
        let preferred: &[&str] = match intent.intent_type {
            IntentType::Definition => &["definition", "glossary", "overview"],
            IntentType::HowTo => &["guide", "tutorial", "procedure"],
            IntentType::Comparison => &["comparison", "table", "overview"],
            IntentType::Factual => &["fact", "table", "statistic"],
            IntentType::List => &["list", "table", "overview"],
            IntentType::General => &[],
        };
        let excluded: &[&str] = if intent.intent_type == IntentType::General {
            &[]
        } else {
            &["navigation", "boilerplate"]
        };
        ContentPreferences {
            preferred_content_types: preferred.iter().map(ToString::to_string).collect(),
            excluded_content_types: excluded.iter().map(ToString::to_string).collect(),
            prefer_numeric: intent.flags.has_numbers || intent.intent_type == IntentType::Factual,
        }
    }

    /// Translate intent and scope into a backend filter: `must` for title
    /// and subcategories, `must_not` for excluded content types.
    ///
    /// Preferred content types stay out of the predicate, since any `should`
    /// clause would drop every chunk of another (or no) type. They are applied
    /// by [`Self::apply_content_preferences`] instead.
    #[must_use]
    pub fn generate_search_filters(&self, intent: &QueryIntent, scope: &DocumentScope) -> QdrantFilter {
        let mut filter = QdrantFilter::default();
        if let Some(title) = &scope.document_title_filter {
            filter = filter.must_match(self.config.title_field.as_str(), title.as_str());
        }
        for (field, value) in &scope.subcategory_filters {
            filter = filter.must_match(field.as_str(), value.as_str());
        }
        if self.config.enable_content_filters {
            let excluded = self.get_content_preferences(intent).excluded_content_types;
            if !excluded.is_empty() {
                filter = filter.must_not_any(self.config.content_type_field.as_str(), excluded);
            }
        }
        filter
    }

    /// Multiply the score of results whose content type the intent prefers by
    /// `content_preference_boost`, then re-sort (stable). Results without a
    /// content type keep their score.
    #[must_use]
    pub fn apply_content_preferences(
        &self,
        mut results: Vec<ScoredResult>,
        intent: &QueryIntent,
    ) -> Vec<ScoredResult> {
        let boost = self.config.content_preference_boost;
        if !self.config.enable_content_filters || boost <= 1.0 {
            return results;
        }
        let preferred = self.get_content_preferences(intent).preferred_content_types;
        if preferred.is_empty() {
            return results;
        }
        let field = self.config.content_type_field.as_str();
        let mut boosted = 0_usize;
        for result in &mut results {
            let is_preferred = result
                .payload
                .get(field)
                .and_then(serde_json::Value::as_str)
                .is_some_and(|kind| preferred.iter().any(|p| p.eq_ignore_ascii_case(kind.trim())));
            if is_preferred {
                result.score *= boost;
                boosted += 1;
            }
        }
        if boosted > 0 {
            results.sort_by(|a, b| b.score.total_cmp(&a.score));
            tracing::debug!(
                event = "retrieval.intent.content_boost",
                boosted,
                intent = ?intent.intent_type,
                "boosted preferred content types"
            );
        }
        results
    }

    fn quoted_phrase(&self, query: &str) -> Option<String> {
        let captures = self.quote_re.captures(query)?;
        captures
            .iter()
            .skip(1)
            .flatten()
            .map(|m| m.as_str().trim().to_string())
            .find(|phrase| !phrase.is_empty())
    }

    fn document_by_name(&self, name_lower: &str) -> Option<&DocumentEntry> {
        self.config.documents.iter().find(|doc| {
            doc.title.trim().to_lowercase() == name_lower
                || doc
                    .aliases
                    .iter()
                    .any(|alias| alias.trim().to_lowercase() == name_lower)
        })
    }

    fn document_mention(&self, haystack_lower: &str) -> Option<(&DocumentEntry, String)> {
        self.document_matcher
            .find_iter(haystack_lower)
            .find(|found| is_word_bounded(haystack_lower, found.start(), found.end()))
            .map(|found| {
                let doc = &self.config.documents[self.document_of_pattern[found.pattern().as_usize()]];
                (doc, haystack_lower[found.start()..found.end()].to_string())
            })
    }
}

fn build_matcher<P: AsRef<[u8]>>(patterns: &[P]) -> Result<AhoCorasick> {
    AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostLongest)
        .build(patterns)
        .map_err(|error| RetrievalError::invalid(format!("intent dictionary: {error}")))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|error| RetrievalError::invalid(format!("intent regex: {error}")))
}

fn is_word_bounded(haystack: &str, start: usize, end: usize) -> bool {
    let before = haystack[..start].chars().next_back();
    let after = haystack[end..].chars().next();
    before.is_none_or(|c| !c.is_alphanumeric()) && after.is_none_or(|c| !c.is_alphanumeric())
}

fn detect_language(lower: &str) -> Language {
    if lower.contains(['ä', 'ö', 'ü', 'ß']) {
        return Language::De;
    }
    let (mut de, mut en) = (0_usize, 0_usize);
    for token in lexicon::tokens(lower) {
        de += usize::from(lexicon::is_stopword_de(&token));
        en += usize::from(lexicon::is_stopword_en(&token));
    }
    match de.cmp(&en) {
        std::cmp::Ordering::Greater => Language::De,
        std::cmp::Ordering::Less => Language::En,
        std::cmp::Ordering::Equal => Language::Unknown,
    }
}

fn extract_keywords(lower: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    lexicon::tokens(lower)
        .filter(|token| token.chars().count() >= 3 && !lexicon::is_stopword(token))
        .filter(|token| seen.insert(token.clone()))
        .collect()
}

/// Intersect with `restrict`; an empty `restrict` or an empty result leaves
/// the set unchanged, an empty set adopts `restrict`.
fn narrow(collections: &mut Vec<String>, restrict: &[String]) {
    if restrict.is_empty() {
        return;
    }
    if collections.is_empty() {
        *collections = restrict.to_vec();
        return;
    }
    let narrowed: Vec<String> = collections
        .iter()
        .filter(|c| restrict.contains(c))
        .cloned()
        .collect();
    if !narrowed.is_empty() {
        *collections = narrowed;
    }
}
