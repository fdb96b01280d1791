//! Result data model shared by backends, fusion, quality and the orchestrator.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::context::ChunkContext;

/// Arbitrary result payload as stored in the vector store.
pub type Payload = serde_json::Map<String, Value>;

/// Point identity. Backends use either numeric or string ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultId {
    /// Numeric id (sequential chunk ids are expandable to neighbors)
    Int(u64),
    /// Opaque string id (UUIDs, composite keys)
    Str(String),
}

impl ResultId {
    /// Numeric value, if this is an integer id.
    #[must_use]
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Str(_) => None,
        }
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
        }
    }
}

impl From<u64> for ResultId {
    fn from(value: u64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for ResultId {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ResultId {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// How the text matcher found a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Query term or phrase matched verbatim
    Exact,
    /// Spelling or inflection variant matched
    Variant,
    /// Last-resort generic token overlap
    TokenFallback,
    /// Matcher gave no classification
    None,
}

impl MatchType {
    /// Exact and variant matches are trusted; fallback and unclassified are not.
    #[must_use]
    pub fn is_reliable(self) -> bool {
        matches!(self, Self::Exact | Self::Variant)
    }
}

/// Which retrieval source(s) produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    /// Vector similarity only
    Vector,
    /// Keyword match only
    Text,
    /// Present in both lists
    Hybrid,
}

/// Scores from the source lists, carried by shape instead of nullable fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Provenance {
    /// Found by the vector store only
    VectorOnly {
        /// Cosine similarity from the store
        vector_score: f64,
    },
    /// Found by the text matcher only
    TextOnly {
        /// Matcher score
        text_score: f64,
        /// Matcher classification
        match_type: MatchType,
    },
    /// Found by both
    Hybrid {
        /// Cosine similarity from the store
        vector_score: f64,
        /// Matcher score
        text_score: f64,
        /// Matcher classification
        match_type: MatchType,
    },
}

impl Provenance {
    /// Flattened source label.
    #[must_use]
    pub fn search_method(&self) -> SearchMethod {
        match self {
            Self::VectorOnly { .. } => SearchMethod::Vector,
            Self::TextOnly { .. } => SearchMethod::Text,
            Self::Hybrid { .. } => SearchMethod::Hybrid,
        }
    }

    /// Match classification, if the text matcher saw this result.
    #[must_use]
    pub fn match_type(&self) -> Option<MatchType> {
        match self {
            Self::VectorOnly { .. } => None,
            Self::TextOnly { match_type, .. } | Self::Hybrid { match_type, .. } => {
                Some(*match_type)
            }
        }
    }

    /// Similarity from the vector store, if any.
    #[must_use]
    pub fn vector_score(&self) -> Option<f64> {
        match self {
            Self::VectorOnly { vector_score } | Self::Hybrid { vector_score, .. } => {
                Some(*vector_score)
            }
            Self::TextOnly { .. } => None,
        }
    }

    /// Score from the text matcher, if any.
    #[must_use]
    pub fn text_score(&self) -> Option<f64> {
        match self {
            Self::TextOnly { text_score, .. } | Self::Hybrid { text_score, .. } => {
                Some(*text_score)
            }
            Self::VectorOnly { .. } => None,
        }
    }
}

/// The pass that produced a [`ScoredResult::score`]. Scores of different
/// kinds are not comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    /// Raw vector store similarity
    Similarity,
    /// Raw text matcher score
    Text,
    /// Reciprocal rank fusion, possibly confidence-weighted
    Rrf,
    /// Weighted linear fusion
    Weighted,
    /// Fusion score rescaled by chunk quality
    QualityAdjusted,
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredResult {
    /// Point identity; unique within any returned list
    pub id: ResultId,
    /// Ranking score, meaningful only together with `score_kind`
    pub score: f64,
    /// Pass that produced `score`
    pub score_kind: ScoreKind,
    /// Stored payload
    pub payload: Payload,
    /// Source scores
    pub provenance: Provenance,
    /// Neighboring chunks, filled by context expansion
    pub context: Option<ChunkContext>,
}

impl ScoredResult {
    /// Wrap a vector store hit unchanged.
    #[must_use]
    pub fn from_vector_hit(hit: VectorHit) -> Self {
        Self {
            id: hit.id,
            score: hit.score,
            score_kind: ScoreKind::Similarity,
            payload: hit.payload,
            provenance: Provenance::VectorOnly {
                vector_score: hit.score,
            },
            context: None,
        }
    }

    /// Wrap a text matcher hit unchanged.
    #[must_use]
    pub fn from_text_hit(hit: TextHit) -> Self {
        Self {
            id: hit.id,
            score: hit.score,
            score_kind: ScoreKind::Text,
            payload: hit.payload,
            provenance: Provenance::TextOnly {
                text_score: hit.score,
                match_type: hit.match_type,
            },
            context: None,
        }
    }

    /// Source label.
    #[must_use]
    pub fn search_method(&self) -> SearchMethod {
        self.provenance.search_method()
    }

    /// Text match classification, if any.
    #[must_use]
    pub fn match_type(&self) -> Option<MatchType> {
        self.provenance.match_type()
    }

    /// Vector similarity before fusion.
    #[must_use]
    pub fn original_vector_score(&self) -> Option<f64> {
        self.provenance.vector_score()
    }

    /// Text score before fusion.
    #[must_use]
    pub fn original_text_score(&self) -> Option<f64> {
        self.provenance.text_score()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoredResultWire<'a> {
    id: &'a ResultId,
    score: f64,
    score_kind: ScoreKind,
    payload: &'a Payload,
    search_method: SearchMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    match_type: Option<MatchType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_vector_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_text_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a ChunkContext>,
}

impl Serialize for ScoredResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ScoredResultWire {
            id: &self.id,
            score: self.score,
            score_kind: self.score_kind,
            payload: &self.payload,
            search_method: self.search_method(),
            match_type: self.match_type(),
            original_vector_score: self.original_vector_score(),
            original_text_score: self.original_text_score(),
            context: self.context.as_ref(),
        }
        .serialize(serializer)
    }
}

/// Vector store neighbor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    /// Point identity
    pub id: ResultId,
    /// Cosine similarity in `[0, 1]`, higher is better
    pub score: f64,
    /// Stored payload
    #[serde(default)]
    pub payload: Payload,
}

/// Text matcher hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextHit {
    /// Point identity
    pub id: ResultId,
    /// Matcher score, higher is better
    pub score: f64,
    /// Stored payload
    #[serde(default)]
    pub payload: Payload,
    /// How the hit was found
    pub match_type: MatchType,
}
