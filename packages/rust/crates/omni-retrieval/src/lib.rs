//! omni-retrieval - Hybrid retrieval core
//!
//! # Architecture
//!
//! ```text
//! omni-retrieval/src/
//! ├── lib.rs           # Re-exports
//! ├── error.rs         # RetrievalError taxonomy
//! ├── types.rs         # ScoredResult, Provenance, backend hits
//! ├── filter.rs        # QdrantFilter + JSON expression converter
//! ├── config.rs        # Hybrid/Quality/Intent/Context settings, YAML loader
//! ├── backend.rs       # VectorStore / TextMatcher traits
//! ├── fusion/          # RRF + weighted fusion, strategy, quality gate
//! ├── quality.rs       # Chunk quality scoring and boosting
//! ├── lexicon.rs       # Stopwords, tokenizer
//! ├── intent.rs        # Intent, language, document scope
//! ├── context.rs       # Neighbor-chunk expansion
//! └── orchestrator.rs  # HybridSearchOrchestrator
//! ```
//!
//! Vector similarity is the primary signal: a failing text matcher degrades a
//! search to vector-only, a failing vector store or embedding provider fails
//! it.

mod backend;
mod config;
mod context;
mod error;
mod filter;
pub mod fusion;
mod intent;
mod lexicon;
mod orchestrator;
mod quality;
mod types;

pub use backend::{TextMatcher, TextQuery, VectorQuery, VectorStore};
pub use config::{
    ContextConfig, DocumentEntry, HybridConfig, IntentConfig, QualityConfig,
    QualityRetrievalConfig, QualityWeights, RetrievalSettings, SubcategoryEntry,
    load_retrieval_settings, load_retrieval_settings_from_paths, retrieval_settings_paths,
};
pub use context::{ChunkContext, ChunkContextExpander, merge_context_text};
pub use error::{Result, RetrievalError};
pub use filter::{Condition, FieldCondition, MatchValue, QdrantFilter, RangeCondition};
pub use fusion::{
    FusionReason, FusionStrategy, apply_quality_gate, calculate_dynamic_threshold,
    determine_fusion_strategy, fuse_rrf, fuse_weighted,
};
pub use intent::{
    ContentPreferences, DocumentScope, IntentDetector, IntentFlags, IntentType, Language,
    QueryIntent,
};
pub use omni_embedding::{EmbeddingConfig, EmbeddingError, EmbeddingService};
pub use orchestrator::{
    FusionMethod, HybridSearchOptions, HybridSearchOrchestrator,
    HybridSearchOrchestratorBuilder, HybridSearchResponse, SearchMetadata,
};
pub use quality::{QualityBreakdown, QualityScorer};
pub use types::{
    MatchType, Payload, Provenance, ResultId, ScoreKind, ScoredResult, SearchMethod, TextHit,
    VectorHit,
};
