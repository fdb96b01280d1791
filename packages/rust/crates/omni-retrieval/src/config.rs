//! Retrieval settings: fusion thresholds, quality weights, intent catalog,
//! context expansion, and the embedding provider.
//!
//! Loads and merges:
//! - System defaults: `<PRJ_ROOT>/packages/conf/retrieval.yaml`
//! - User overrides:  `<PRJ_CONFIG_HOME>/omni-dev-fusion/retrieval.yaml`
//!
//! Mappings are deep-merged (user wins per key); lists and scalars are
//! replaced wholesale. Missing files fall back to defaults; unreadable or
//! invalid files are logged and ignored.

use std::path::{Path, PathBuf};

use omni_embedding::EmbeddingConfig;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;

use crate::error::{Result, RetrievalError};

const DEFAULT_SYSTEM_SETTINGS_RELATIVE_PATH: &str = "packages/conf/retrieval.yaml";
const DEFAULT_USER_SETTINGS_RELATIVE_PATH: &str = "omni-dev-fusion/retrieval.yaml";
const DEFAULT_CONFIG_HOME_RELATIVE_PATH: &str = ".config";

/// Fusion, threshold and quality-gate tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    /// Results returned when the caller gives no limit
    pub default_limit: usize,
    /// Per-backend recall is `limit * recall_multiplier`
    pub recall_multiplier: usize,
    /// Similarity floor when the caller gives no threshold
    pub default_threshold: f64,
    /// RRF damping constant
    pub rrf_k: f64,

    /// Raise thresholds by text corroboration
    pub enable_dynamic_threshold: bool,
    /// Floor for vector hits when text matches exist
    pub min_vector_with_text_threshold: f64,
    /// Floor for vector hits when nothing else anchors relevance
    pub min_vector_only_threshold: f64,

    /// Drop weak results after fusion
    pub enable_quality_gate: bool,
    /// Minimum fused score for any result
    pub min_final_score: f64,
    /// Minimum fused score for vector-only results without text matches.
    ///
    /// Compared against the fused score, which weighted fusion has already
    /// scaled by the normalized vector weight. The similarity a vector-only
    /// hit needs is therefore `min_vector_only_final_score / vector_weight`:
    /// 0.55 under `1.0 / 0.0`, about 0.61 under the fallback weights, and
    /// about 0.79 under `vector_only_weight / text_only_weight`.
    pub min_vector_only_final_score: f64,

    /// Multiply RRF scores by source agreement
    pub enable_confidence_weighting: bool,
    /// Multiplier for results found by both backends
    pub confidence_boost: f64,
    /// Multiplier for vector-only results
    pub confidence_penalty: f64,

    /// Weighted mode: vector share when RRF is not preferred
    pub vector_only_weight: f64,
    /// Weighted mode: text share when RRF is not preferred
    pub text_only_weight: f64,
    /// Weighted mode: vector share when only fallback text matches exist
    pub fallback_vector_weight: f64,
    /// Weighted mode: text share when only fallback text matches exist
    pub fallback_text_weight: f64,
    /// RRF mode: reported vector share
    pub balanced_vector_weight: f64,
    /// RRF mode: reported text share
    pub balanced_text_weight: f64,
    /// Fewer text results than this force weighted fusion
    pub min_text_results_for_rrf: usize,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            recall_multiplier: 3,
            default_threshold: 0.3,
            rrf_k: 60.0,
            enable_dynamic_threshold: true,
            min_vector_with_text_threshold: 0.35,
            min_vector_only_threshold: 0.5,
            enable_quality_gate: true,
            min_final_score: 0.005,
            min_vector_only_final_score: 0.55,
            enable_confidence_weighting: false,
            confidence_boost: 1.2,
            confidence_penalty: 0.9,
            vector_only_weight: 0.7,
            text_only_weight: 0.3,
            fallback_vector_weight: 0.9,
            fallback_text_weight: 0.1,
            balanced_vector_weight: 0.5,
            balanced_text_weight: 0.5,
            min_text_results_for_rrf: 2,
        }
    }
}

impl HybridConfig {
    /// Reject values fusion cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidInput`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.default_limit == 0 {
            return Err(RetrievalError::invalid("hybrid.default_limit must be positive"));
        }
        if self.recall_multiplier == 0 {
            return Err(RetrievalError::invalid(
                "hybrid.recall_multiplier must be positive",
            ));
        }
        if !(self.rrf_k.is_finite() && self.rrf_k > 0.0) {
            return Err(RetrievalError::invalid("hybrid.rrf_k must be positive"));
        }
        for (name, value) in [
            ("default_threshold", self.default_threshold),
            ("min_vector_with_text_threshold", self.min_vector_with_text_threshold),
            ("min_vector_only_threshold", self.min_vector_only_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RetrievalError::invalid(format!(
                    "hybrid.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        for (name, value) in [
            ("min_final_score", self.min_final_score),
            ("min_vector_only_final_score", self.min_vector_only_final_score),
            ("confidence_boost", self.confidence_boost),
            ("confidence_penalty", self.confidence_penalty),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(RetrievalError::invalid(format!(
                    "hybrid.{name} must be a non-negative number, got {value}"
                )));
            }
        }
        for (name, vector, text) in [
            ("vector_only/text_only", self.vector_only_weight, self.text_only_weight),
            ("fallback", self.fallback_vector_weight, self.fallback_text_weight),
            ("balanced", self.balanced_vector_weight, self.balanced_text_weight),
        ] {
            crate::fusion::normalize_weights(vector, text).map_err(|_| {
                RetrievalError::invalid(format!("hybrid.{name} weights are invalid"))
            })?;
        }
        Ok(())
    }
}

/// Quality sub-score weights and retrieval-time quality controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Sub-score weights; normalized by their sum
    pub weights: QualityWeights,
    /// Word count a chunk needs to count as complete
    pub min_complete_words: usize,
    /// Retrieval-time gate and boost
    pub retrieval: QualityRetrievalConfig,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            weights: QualityWeights::default(),
            min_complete_words: 12,
            retrieval: QualityRetrievalConfig::default(),
        }
    }
}

/// Weights of the four quality sub-scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    /// Sentence length and alphabetic share
    pub readability: f64,
    /// Clean start, clean end, enough words
    pub completeness: f64,
    /// Paragraphs, headings, lists, title metadata
    pub structure: f64,
    /// Distinct content words per word
    pub density: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            readability: 0.3,
            completeness: 0.3,
            structure: 0.2,
            density: 0.2,
        }
    }
}

impl QualityWeights {
    pub(crate) fn total(&self) -> f64 {
        self.readability + self.completeness + self.structure + self.density
    }
}

/// Quality controls applied during a search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityRetrievalConfig {
    /// Drop results below `min_quality`
    pub enable_quality_filter: bool,
    /// Quality floor for the filter
    pub min_quality: f64,
    /// Rescale scores by quality
    pub enable_quality_boost: bool,
    /// Multiplier at quality 1.0 is `1 + (boost_factor - 1) / 2`
    pub boost_factor: f64,
}

impl Default for QualityRetrievalConfig {
    fn default() -> Self {
        Self {
            enable_quality_filter: false,
            min_quality: 0.3,
            enable_quality_boost: true,
            boost_factor: 1.2,
        }
    }
}

impl QualityConfig {
    /// Reject unusable weights and thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidInput`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let w = self.weights;
        if [w.readability, w.completeness, w.structure, w.density]
            .iter()
            .any(|value| !(value.is_finite() && *value >= 0.0))
            || w.total() <= 0.0
        {
            return Err(RetrievalError::invalid(
                "quality.weights must be non-negative with a positive sum",
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_quality) {
            return Err(RetrievalError::invalid(
                "quality.retrieval.min_quality must be within [0, 1]",
            ));
        }
        if !(self.retrieval.boost_factor.is_finite() && self.retrieval.boost_factor >= 0.0) {
            return Err(RetrievalError::invalid(
                "quality.retrieval.boost_factor must be a non-negative number",
            ));
        }
        Ok(())
    }
}

/// Static lexical catalog for intent and scope detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConfig {
    /// Known documents addressable by title or alias
    pub documents: Vec<DocumentEntry>,
    /// Keywords that pin a payload field to a value
    pub subcategories: Vec<SubcategoryEntry>,
    /// Payload field holding the document title
    pub title_field: String,
    /// Payload field holding the content type
    pub content_type_field: String,
    /// Exclude avoided content types (`must_not`) and boost preferred ones
    pub enable_content_filters: bool,
    /// Score multiplier for results whose content type the intent prefers
    pub content_preference_boost: f64,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            documents: Vec::new(),
            subcategories: Vec::new(),
            title_field: "document_title".to_string(),
            content_type_field: "content_type".to_string(),
            enable_content_filters: true,
            content_preference_boost: 1.1,
        }
    }
}

/// One addressable document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEntry {
    /// Canonical title, used as the filter value
    pub title: String,
    /// Alternative names that also select this document
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Collections holding this document; empty means any
    #[serde(default)]
    pub collections: Vec<String>,
}

/// One subcategory keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubcategoryEntry {
    /// Word or phrase that triggers this subcategory
    pub keyword: String,
    /// Payload field to constrain
    pub field: String,
    /// Required value of `field`
    pub value: String,
    /// Collections holding this subcategory; empty means any
    #[serde(default)]
    pub collections: Vec<String>,
}

impl IntentConfig {
    /// Reject blank catalog entries.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidInput`] for an empty title, keyword,
    /// or field name.
    pub fn validate(&self) -> Result<()> {
        if let Some(doc) = self.documents.iter().find(|d| d.title.trim().is_empty()) {
            return Err(RetrievalError::invalid(format!(
                "intent.documents has an entry without title (aliases {:?})",
                doc.aliases
            )));
        }
        if self
            .subcategories
            .iter()
            .any(|s| s.keyword.trim().is_empty() || s.field.trim().is_empty())
        {
            return Err(RetrievalError::invalid(
                "intent.subcategories entries need keyword and field",
            ));
        }
        if self.title_field.trim().is_empty() || self.content_type_field.trim().is_empty() {
            return Err(RetrievalError::invalid(
                "intent.title_field and intent.content_type_field must not be empty",
            ));
        }
        if !self.content_preference_boost.is_finite() || self.content_preference_boost < 1.0 {
            return Err(RetrievalError::invalid(format!(
                "intent.content_preference_boost must be >= 1.0, got {}",
                self.content_preference_boost
            )));
        }
        Ok(())
    }
}

/// Neighbor-chunk expansion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Chunks fetched on each side of the center
    pub window: usize,
    /// Payload field identifying the source document
    pub document_field: String,
    /// Payload field holding the chunk's position in its document
    pub index_field: String,
    /// Payload field holding the chunk text
    pub text_field: String,
    /// Shortest word overlap trimmed when merging adjacent chunks
    pub min_overlap_words: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window: 2,
            document_field: "document_id".to_string(),
            index_field: "chunk_index".to_string(),
            text_field: "text".to_string(),
            min_overlap_words: 3,
        }
    }
}

impl ContextConfig {
    /// Field names must be set and the overlap threshold positive.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidInput`] naming the bad field.
    pub fn validate(&self) -> Result<()> {
        if self.document_field.trim().is_empty()
            || self.index_field.trim().is_empty()
            || self.text_field.trim().is_empty()
        {
            return Err(RetrievalError::invalid("context field names must not be empty"));
        }
        if self.min_overlap_words == 0 {
            return Err(RetrievalError::invalid(
                "context.min_overlap_words must be positive",
            ));
        }
        Ok(())
    }
}

/// Everything the retrieval core reads at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Fusion and thresholds
    pub hybrid: HybridConfig,
    /// Quality scoring
    pub quality: QualityConfig,
    /// Intent and scope catalog
    pub intent: IntentConfig,
    /// Context expansion
    pub context: ContextConfig,
    /// Embedding provider
    pub embedding: EmbeddingConfig,
}

impl RetrievalSettings {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns the first section error.
    pub fn validate(&self) -> Result<()> {
        self.hybrid.validate()?;
        self.quality.validate()?;
        self.intent.validate()?;
        self.context.validate()?;
        self.embedding.validate()?;
        Ok(())
    }
}

/// Load merged retrieval settings (user overrides system).
#[must_use]
pub fn load_retrieval_settings() -> RetrievalSettings {
    let (system_path, user_path) = retrieval_settings_paths();
    load_retrieval_settings_from_paths(&system_path, &user_path)
}

/// System and user settings paths derived from `PRJ_ROOT` / `PRJ_CONFIG_HOME`.
#[must_use]
pub fn retrieval_settings_paths() -> (PathBuf, PathBuf) {
    let root = project_root();
    let system_path = root.join(DEFAULT_SYSTEM_SETTINGS_RELATIVE_PATH);
    let user_path = resolve_config_home(&root).join(DEFAULT_USER_SETTINGS_RELATIVE_PATH);
    (system_path, user_path)
}

/// Load and deep-merge two settings files.
#[must_use]
pub fn load_retrieval_settings_from_paths(system: &Path, user: &Path) -> RetrievalSettings {
    let mut merged = YamlValue::Mapping(serde_yaml::Mapping::new());
    for path in [system, user] {
        if let Some(layer) = load_layer(path) {
            deep_merge(&mut merged, layer);
        }
    }
    let settings = match serde_yaml::from_value::<RetrievalSettings>(merged) {
        Ok(settings) => settings,
        Err(error) => {
            tracing::warn!(
                system = %system.display(),
                user = %user.display(),
                error = %error,
                "merged retrieval settings do not fit the schema; using defaults"
            );
            return RetrievalSettings::default();
        }
    };
    if let Err(error) = settings.validate() {
        tracing::warn!(
            system = %system.display(),
            user = %user.display(),
            error = %error,
            "invalid retrieval settings; using defaults"
        );
        return RetrievalSettings::default();
    }
    settings
}

fn load_layer(path: &Path) -> Option<YamlValue> {
    if !path.exists() {
        return None;
    }
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "failed to read settings file; ignoring"
            );
            return None;
        }
    };
    match serde_yaml::from_str::<YamlValue>(&raw) {
        Ok(YamlValue::Mapping(map)) => Some(YamlValue::Mapping(map)),
        Ok(YamlValue::Null) => None,
        Ok(_) => {
            tracing::warn!(
                path = %path.display(),
                "settings yaml is not a mapping; ignoring file"
            );
            None
        }
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "failed to parse settings yaml; ignoring file"
            );
            None
        }
    }
}

fn deep_merge(base: &mut YamlValue, overlay: YamlValue) {
    match (base, overlay) {
        (YamlValue::Mapping(base_map), YamlValue::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn project_root() -> PathBuf {
    std::env::var("PRJ_ROOT")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn resolve_config_home(project_root: &Path) -> PathBuf {
    let configured = std::env::var("PRJ_CONFIG_HOME")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_HOME_RELATIVE_PATH.to_string());
    let path = PathBuf::from(configured);
    if path.is_absolute() {
        path
    } else {
        project_root.join(path)
    }
}
