//! # geoauction
//!
//! Geo-targeted ad auctions. Given a requester and a location, geoauction
//! finds the advertisements whose service zones contain the point, ranks them
//! by cosine similarity to the requester's preference embedding, keeps the
//! top 10, and awards the auction to the highest bid among them.
//!
//! ## Quick Start
//!
//! ### As a Server
//!
//! ```bash
//! geoauction --http-port 8080 --catalog catalog.json --snapshot data/catalog.bin
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use geoauction::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> geoauction::Result<()> {
//! let catalog = Arc::new(MemoryCatalog::new(CatalogConfig { embedding_dim: 3, ..Default::default() })?);
//! let ad = catalog.create_advertisement(NewAdvertisement::new(5.0, Vector::new(vec![1.0, 0.0, 0.0])))?;
//! catalog.add_zone(ad, NewGeoZone::circle("Times Square", GeoPoint::new(40.758, -73.9855), 2000.0))?;
//!
//! let store = Arc::new(PooledStore::new(catalog, PoolConfig::default())?);
//! let engine = AuctionEngine::new(store, EngineConfig { embedding_dim: 3, ..Default::default() })?;
//!
//! let request = AuctionRequest::new(1534556u64, 40.7585, -73.985)
//!     .with_query_embedding(Vector::new(vec![1.0, 0.0, 0.0]));
//! let outcome = engine.resolve(&request).await?;
//! assert_eq!(outcome.result.winner(), Some(ad));
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! - `geoauction-core` - Data model, geometry, vectors, HNSW, ranking order, store traits
//! - `geoauction-storage` - In-memory catalog, geo grid, session pool, snapshots, seed catalogs
//! - `geoauction-engine` - Auction resolution, selection, deadlines and retries
//! - `geoauction-api` - REST surface

// Re-export core types
pub use geoauction_core::{
    AdFilter, AdGeoZone, AdId, Advertisement, AuctionStore, Error, ErrorKind, GeoPoint,
    Geometry, HashingEmbedder, KeywordEmbedder, NewAdvertisement, NewGeoZone, RankedCandidate,
    Result, UserId, UserPreferenceEmbedding, Vector, ZoneId,
};

// Re-export storage
pub use geoauction_storage::{
    CatalogConfig, CatalogSnapshot, MemoryCatalog, PoolConfig, PooledStore, SeedCatalog,
    SnapshotFile,
};

// Re-export engine
pub use geoauction_engine::{
    with_retry, AuctionEngine, AuctionOutcome, AuctionRequest, AuctionResult, EngineConfig,
    MissingEmbeddingPolicy, NoWinnerReason, RetryConfig, SelectionMethod,
};

// Re-export API
pub use geoauction_api::{ApiState, RestApi};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        AdId, AuctionEngine, AuctionRequest, AuctionResult, CatalogConfig, EngineConfig, Error,
        GeoPoint, MemoryCatalog, NewAdvertisement, NewGeoZone, PoolConfig, PooledStore, Result,
        UserId, Vector,
    };
}
