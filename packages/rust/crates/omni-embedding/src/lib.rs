//! omni-embedding - Embedding generation for hybrid retrieval
//!
//! # Architecture
//!
//! ```text
//! omni-embedding/src/
//! ├── lib.rs        # Re-exports
//! ├── config.rs     # EmbeddingConfig, BatchOptions
//! ├── error.rs      # EmbeddingError taxonomy
//! ├── batching.rs   # Token estimate + greedy batch planner
//! ├── retry.rs      # RetryPolicy + retry_with_backoff
//! ├── transport.rs  # EmbeddingTransport trait, HTTP provider
//! └── service.rs    # EmbeddingService (single + batch)
//! ```
//!
//! Every async entry point takes a `CancellationToken`; cancelling it stops
//! in-flight provider calls, backoff sleeps and inter-batch delays.

mod batching;
mod config;
mod error;
mod retry;
mod service;
mod transport;

pub use batching::{estimate_tokens, plan_batches};
pub use config::{BatchOptions, EmbeddingConfig};
pub use error::EmbeddingError;
pub use retry::{RetryPolicy, retry_with_backoff};
pub use service::EmbeddingService;
pub use transport::{EmbeddingTransport, HttpEmbeddingTransport};
