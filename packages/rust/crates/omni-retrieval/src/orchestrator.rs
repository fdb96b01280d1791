//! Hybrid search orchestration: intent → embedding → parallel retrieval →
//! fusion → quality gate and boosts → optional context expansion.
//!
//! The vector branch (embed, then query the store) and the text branch run
//! concurrently and the whole request races the caller's cancellation token.
//! A failing text matcher degrades the request to vector-only; a failing
//! embedding or vector store fails it.

use std::sync::Arc;
use std::time::Instant;

use omni_embedding::EmbeddingService;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::backend::{TextMatcher, TextQuery, VectorQuery, VectorStore};
use crate::config::{HybridConfig, RetrievalSettings};
use crate::context::ChunkContextExpander;
use crate::error::{Result, RetrievalError};
use crate::filter::QdrantFilter;
use crate::fusion::{
    FusionReason, apply_quality_gate, calculate_dynamic_threshold, determine_fusion_strategy,
    fuse_rrf, fuse_weighted, normalize_weights,
};
use crate::intent::{DocumentScope, IntentDetector, QueryIntent};
use crate::quality::QualityScorer;
use crate::types::{ScoredResult, TextHit, VectorHit};

/// Per-call search parameters; unset fields fall back to [`HybridConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HybridSearchOptions {
    /// Results to return
    pub limit: Option<usize>,
    /// Base similarity threshold in `[0, 1]`
    pub threshold: Option<f64>,
    /// Vector share when weighted fusion honours caller weights
    pub vector_weight: Option<f64>,
    /// Text share when weighted fusion honours caller weights
    pub text_weight: Option<f64>,
    /// Prefer RRF when both lists are usable
    #[serde(rename = "useRRF")]
    pub use_rrf: Option<bool>,
    /// RRF damping constant
    pub rrf_k: Option<f64>,
    /// Caller filter, merged with the intent/scope filter
    pub filter: Option<QdrantFilter>,
    /// Hits requested from each backend
    pub recall_limit: Option<usize>,
    /// Attach neighbor-chunk context to each result
    pub expand_context: Option<bool>,
}

impl HybridSearchOptions {
    /// Builder: result count.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Builder: base similarity threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Builder: fusion weights.
    #[must_use]
    pub fn with_weights(mut self, vector_weight: f64, text_weight: f64) -> Self {
        self.vector_weight = Some(vector_weight);
        self.text_weight = Some(text_weight);
        self
    }

    /// Builder: RRF preference.
    #[must_use]
    pub fn with_rrf(mut self, use_rrf: bool) -> Self {
        self.use_rrf = Some(use_rrf);
        self
    }

    /// Builder: caller filter.
    #[must_use]
    pub fn with_filter(mut self, filter: QdrantFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Builder: per-backend recall.
    #[must_use]
    pub fn with_recall_limit(mut self, recall_limit: usize) -> Self {
        self.recall_limit = Some(recall_limit);
        self
    }

    /// Builder: context expansion.
    #[must_use]
    pub fn with_context(mut self, expand_context: bool) -> Self {
        self.expand_context = Some(expand_context);
        self
    }
}

/// Options after defaults and validation.
#[derive(Debug)]
struct ResolvedOptions {
    limit: usize,
    recall_limit: usize,
    threshold: f64,
    vector_weight: f64,
    text_weight: f64,
    use_rrf: bool,
    rrf_k: f64,
    filter: Option<QdrantFilter>,
    expand_context: bool,
}

/// Fusion mode actually used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMethod {
    /// Reciprocal rank fusion
    Rrf,
    /// Weighted linear fusion
    Weighted,
}

/// How a response was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMetadata {
    /// Vector hits that passed the effective threshold
    pub vector_results: usize,
    /// Text hits used for fusion
    pub text_results: usize,
    /// Fusion mode
    pub fusion_method: FusionMethod,
    /// Policy branch that chose the mode
    pub fusion_reason: FusionReason,
    /// At least one exact or variant text hit
    pub has_text_matches: bool,
    /// Similarity floor applied to vector hits
    pub effective_threshold: f64,
    /// Text matcher failed and the search ran vector-only
    pub text_backend_degraded: bool,
    /// Non-fatal problems
    pub warnings: Vec<String>,
    /// Query classification
    pub intent: QueryIntent,
    /// Resolved scope
    pub scope: DocumentScope,
    /// Wall time
    pub elapsed_ms: u64,
}

/// Ranked results plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridSearchResponse {
    /// Final ranking, at most `limit` long
    pub results: Vec<ScoredResult>,
    /// How the ranking was produced
    pub metadata: SearchMetadata,
}

#[derive(Debug, Clone, Copy)]
enum SearchStage {
    Received,
    IntentResolved,
    Embedded,
    Retrieved,
    Fused,
    QualityGated,
    ContextExpanded,
    Responded,
    EmbeddingFailed,
    RetrievalFailed,
}

impl SearchStage {
    fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::IntentResolved => "intent_resolved",
            Self::Embedded => "embedded",
            Self::Retrieved => "retrieved",
            Self::Fused => "fused",
            Self::QualityGated => "quality_gated",
            Self::ContextExpanded => "context_expanded",
            Self::Responded => "responded",
            Self::EmbeddingFailed => "embedding_failed",
            Self::RetrievalFailed => "retrieval_failed",
        }
    }
}

fn log_stage(stage: SearchStage, started: Instant) {
    tracing::debug!(
        event = "retrieval.search.stage",
        stage = stage.as_str(),
        elapsed_ms = started.elapsed().as_millis(),
        "search stage reached"
    );
}

/// Top-level hybrid search coordinator.
///
/// Built once with its settings and backends, then shared across requests;
/// holds no per-request state.
pub struct HybridSearchOrchestrator {
    embedder: EmbeddingService,
    vector_store: Arc<dyn VectorStore>,
    text_matcher: Option<Arc<dyn TextMatcher>>,
    hybrid: HybridConfig,
    quality: QualityScorer,
    intent: IntentDetector,
    context: ChunkContextExpander,
    collections: Vec<String>,
}

/// Builder for [`HybridSearchOrchestrator`].
pub struct HybridSearchOrchestratorBuilder {
    embedder: EmbeddingService,
    vector_store: Arc<dyn VectorStore>,
    text_matcher: Option<Arc<dyn TextMatcher>>,
    settings: RetrievalSettings,
    collections: Vec<String>,
}

impl HybridSearchOrchestratorBuilder {
    /// Add a text matcher; without one every search is vector-only.
    #[must_use]
    pub fn text_matcher(mut self, text_matcher: Arc<dyn TextMatcher>) -> Self {
        self.text_matcher = Some(text_matcher);
        self
    }

    /// Replace the default settings.
    #[must_use]
    pub fn settings(mut self, settings: RetrievalSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Collections scope detection may narrow.
    #[must_use]
    pub fn collections<S: Into<String>>(mut self, collections: impl IntoIterator<Item = S>) -> Self {
        self.collections = collections.into_iter().map(Into::into).collect();
        self
    }

    /// Validate settings and compile the intent catalog.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidInput`] for invalid settings.
    pub fn build(self) -> Result<HybridSearchOrchestrator> {
        let RetrievalSettings {
            hybrid,
            quality,
            intent,
            context,
            embedding: _,
        } = self.settings;
        hybrid.validate()?;
        quality.validate()?;
        context.validate()?;
        Ok(HybridSearchOrchestrator {
            embedder: self.embedder,
            context: ChunkContextExpander::new(Arc::clone(&self.vector_store), context),
            vector_store: self.vector_store,
            text_matcher: self.text_matcher,
            hybrid,
            quality: QualityScorer::new(quality),
            intent: IntentDetector::new(intent)?,
            collections: self.collections,
        })
    }
}

impl HybridSearchOrchestrator {
    /// Start building an orchestrator around its two mandatory collaborators.
    #[must_use]
    pub fn builder(
        embedder: EmbeddingService,
        vector_store: Arc<dyn VectorStore>,
    ) -> HybridSearchOrchestratorBuilder {
        HybridSearchOrchestratorBuilder {
            embedder,
            vector_store,
            text_matcher: None,
            settings: RetrievalSettings::default(),
            collections: Vec::new(),
        }
    }

    /// Run one hybrid search.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::InvalidInput`] for an empty query or bad options
    /// - [`RetrievalError::Embedding`] when the query cannot be embedded
    /// - [`RetrievalError::VectorBackend`] when the vector store fails
    /// - [`RetrievalError::Cancelled`] when `cancel` fires first
    pub async fn search(
        &self,
        query: &str,
        options: HybridSearchOptions,
        cancel: &CancellationToken,
    ) -> Result<HybridSearchResponse> {
        let started = Instant::now();
        log_stage(SearchStage::Received, started);

        let query = query.trim();
        if query.is_empty() {
            return Err(RetrievalError::invalid("query must not be empty"));
        }
        let mut options = self.resolve_options(options)?;
        if cancel.is_cancelled() {
            return Err(RetrievalError::Cancelled);
        }

        let intent = self.intent.detect_intent(query);
        let scope = self.intent.detect_document_scope(query, &self.collections);
        let filter = options
            .filter
            .take()
            .unwrap_or_default()
            .merge(self.intent.generate_search_filters(&intent, &scope));
        let filter = (!filter.is_empty()).then_some(filter);
        log_stage(SearchStage::IntentResolved, started);

        // has_text_matches is unknown until fan-in: query with the lower floor,
        // apply the final one afterwards.
        let store_threshold = calculate_dynamic_threshold(options.threshold, true, &self.hybrid)
            .min(calculate_dynamic_threshold(options.threshold, false, &self.hybrid));

        let vector_branch = async {
            let embedding = match self.embedder.generate_embedding(query, cancel).await {
                Ok(embedding) => embedding,
                Err(error) => {
                    log_stage(SearchStage::EmbeddingFailed, started);
                    return Err(RetrievalError::from(error));
                }
            };
            log_stage(SearchStage::Embedded, started);
            self.vector_store
                .query(VectorQuery {
                    embedding: &embedding,
                    limit: options.recall_limit,
                    score_threshold: store_threshold,
                    filter: filter.as_ref(),
                    collections: &scope.collections,
                })
                .await
                .map_err(|error| {
                    log_stage(SearchStage::RetrievalFailed, started);
                    RetrievalError::VectorBackend(format!("{error:#}"))
                })
        };
        let text_branch = async {
            match &self.text_matcher {
                Some(matcher) => matcher
                    .search(TextQuery {
                        query,
                        limit: options.recall_limit,
                        filter: filter.as_ref(),
                        collections: &scope.collections,
                    })
                    .await
                    .map(Some),
                None => Ok(None),
            }
        };

        let (vector_outcome, text_outcome) = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RetrievalError::Cancelled),
            outcomes = async { tokio::join!(vector_branch, text_branch) } => outcomes,
        };
        let vector_hits: Vec<VectorHit> = vector_outcome?;

        let mut warnings = Vec::new();
        let mut text_backend_degraded = false;
        let text_hits: Vec<TextHit> = match text_outcome {
            Ok(hits) => hits.unwrap_or_default(),
            Err(error) => {
                let error = RetrievalError::TextBackend(format!("{error:#}"));
                tracing::warn!(
                    event = "retrieval.search.text_degraded",
                    kind = error.kind(),
                    error = %error,
                    "text backend failed; continuing vector-only"
                );
                warnings.push(format!("{error}; results are vector-only"));
                text_backend_degraded = true;
                Vec::new()
            }
        };

        let has_text_matches = text_hits.iter().any(|hit| hit.match_type.is_reliable());
        let effective_threshold =
            calculate_dynamic_threshold(options.threshold, has_text_matches, &self.hybrid);
        let vector_hits: Vec<VectorHit> = vector_hits
            .into_iter()
            .filter(|hit| hit.score >= effective_threshold)
            .collect();
        log_stage(SearchStage::Retrieved, started);

        let strategy = determine_fusion_strategy(&text_hits, options.use_rrf, &self.hybrid);
        let fused = if strategy.use_rrf {
            fuse_rrf(
                &vector_hits,
                &text_hits,
                options.recall_limit,
                options.rrf_k,
                &self.hybrid,
            )?
        } else {
            let (vector_weight, text_weight) =
                if strategy.reason == FusionReason::RrfPreferenceDisabled {
                    (options.vector_weight, options.text_weight)
                } else {
                    (strategy.vector_weight, strategy.text_weight)
                };
            fuse_weighted(
                &vector_hits,
                &text_hits,
                vector_weight,
                text_weight,
                options.recall_limit,
            )?
        };
        log_stage(SearchStage::Fused, started);

        let retrieval = self.quality.config().retrieval;
        let gated = apply_quality_gate(fused, has_text_matches, &self.hybrid);
        let filtered = self.quality.filter_by_quality(gated, retrieval.min_quality);
        let boosted = if retrieval.enable_quality_boost {
            self.quality.apply_quality_boost(filtered, retrieval.boost_factor)
        } else {
            filtered
        };
        let mut results = self.intent.apply_content_preferences(boosted, &intent);
        results.truncate(options.limit);
        log_stage(SearchStage::QualityGated, started);

        if options.expand_context && !results.is_empty() {
            match self.context.get_batch_chunk_context(&results, cancel).await {
                Ok(contexts) => {
                    for (result, context) in results.iter_mut().zip(contexts) {
                        result.context = Some(context);
                    }
                    log_stage(SearchStage::ContextExpanded, started);
                }
                Err(RetrievalError::Cancelled) => return Err(RetrievalError::Cancelled),
                Err(error) => {
                    tracing::warn!(
                        event = "retrieval.search.context_failed",
                        error = %error,
                        "context expansion failed; returning results without context"
                    );
                    warnings.push(format!("context expansion failed: {error}"));
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(RetrievalError::Cancelled);
        }
        log_stage(SearchStage::Responded, started);
        tracing::debug!(
            event = "retrieval.search.completed",
            results = results.len(),
            vector_results = vector_hits.len(),
            text_results = text_hits.len(),
            use_rrf = strategy.use_rrf,
            reason = ?strategy.reason,
            elapsed_ms = started.elapsed().as_millis(),
            "hybrid search completed"
        );

        Ok(HybridSearchResponse {
            results,
            metadata: SearchMetadata {
                vector_results: vector_hits.len(),
                text_results: text_hits.len(),
                fusion_method: if strategy.use_rrf {
                    FusionMethod::Rrf
                } else {
                    FusionMethod::Weighted
                },
                fusion_reason: strategy.reason,
                has_text_matches,
                effective_threshold,
                text_backend_degraded,
                warnings,
                intent,
                scope,
                elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            },
        })
    }

    fn resolve_options(&self, options: HybridSearchOptions) -> Result<ResolvedOptions> {
        let config = &self.hybrid;
        let limit = options.limit.unwrap_or(config.default_limit);
        if limit == 0 {
            return Err(RetrievalError::invalid("limit must be positive"));
        }
        let recall_limit = options
            .recall_limit
            .unwrap_or_else(|| limit.saturating_mul(config.recall_multiplier))
            .max(limit);

        let threshold = options.threshold.unwrap_or(config.default_threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(RetrievalError::invalid(format!(
                "threshold must be within [0, 1], got {threshold}"
            )));
        }
        let rrf_k = options.rrf_k.unwrap_or(config.rrf_k);
        if !(rrf_k.is_finite() && rrf_k > 0.0) {
            return Err(RetrievalError::invalid(format!(
                "rrfK must be positive, got {rrf_k}"
            )));
        }
        let (vector_weight, text_weight) = normalize_weights(
            options.vector_weight.unwrap_or(config.vector_only_weight),
            options.text_weight.unwrap_or(config.text_only_weight),
        )?;

        Ok(ResolvedOptions {
            limit,
            recall_limit,
            threshold,
            vector_weight,
            text_weight,
            use_rrf: options.use_rrf.unwrap_or(true),
            rrf_k,
            filter: options.filter,
            expand_context: options.expand_context.unwrap_or(false),
        })
    }
}
