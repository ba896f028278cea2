//! # geoauction engine
//!
//! Resolves one geo-targeted ad auction: preference embedding lookup, geo
//! eligibility, top-k cosine similarity ranking, then highest-bid selection.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use geoauction_engine::{AuctionEngine, AuctionRequest, EngineConfig};
//! use geoauction_core::AuctionStore;
//!
//! async fn show_ad<S: AuctionStore>(store: Arc<S>) -> geoauction_core::Result<()> {
//!     let engine = AuctionEngine::new(store, EngineConfig::default())?;
//!     let request = AuctionRequest::new(1534556u64, 40.758, -73.9855)
//!         .with_keywords("coffee", "gambling");
//!     let outcome = engine.resolve(&request).await?;
//!     println!("winner: {:?}", outcome.result.winner());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod ranker;
pub mod request;
pub mod retry;
pub mod selector;

pub use config::{EngineConfig, MissingEmbeddingPolicy};
pub use engine::{AuctionEngine, AuctionOutcome, AuctionResult, NoWinnerReason, ResolutionStage};
pub use ranker::SimilarityRanker;
pub use request::{AuctionRequest, SelectionMethod};
pub use retry::{with_retry, RetryConfig};
pub use selector::{AuctionSelector, Selection};
