//! # geoauction core
//!
//! Data model and algorithms shared by the geoauction crates:
//!
//! - [`Advertisement`], [`AdGeoZone`], [`UserPreferenceEmbedding`] - the catalog records
//! - [`Vector`] - dense embeddings with SIMD-accelerated cosine distance
//! - [`GeoPoint`], [`Geometry`] - service areas and point containment
//! - [`HnswIndex`] - approximate nearest neighbor index over ad embeddings
//! - [`ranking`] - exact top-k ranking with deterministic tie-breaks
//! - [`store`] - the storage collaborator contract used by the engine
//!
//! ## Example
//!
//! ```rust
//! use geoauction_core::{GeoPoint, NewGeoZone, Vector};
//!
//! let zone = NewGeoZone::circle("Downtown", GeoPoint::new(40.7128, -74.0060), 2_000.0);
//! let region = zone.region().unwrap();
//! assert!(region.contains(&GeoPoint::new(40.7130, -74.0050)));
//!
//! let a = Vector::new(vec![1.0, 0.0]);
//! let b = Vector::new(vec![0.0, 1.0]);
//! assert!((a.cosine_distance(&b) - 1.0).abs() < 1e-6);
//! ```

pub mod advertisement;
pub mod embedder;
pub mod error;
pub mod filter;
pub mod geo;
pub mod hnsw;
pub mod ranking;
pub mod store;
pub mod vector;

/// SIMD-optimized vector operations
///
/// AVX2/FMA on x86_64, unrolled scalar code elsewhere.
pub mod simd;

pub use advertisement::{
    AdGeoZone, AdId, Advertisement, Conversion, NewAdvertisement, NewGeoZone,
    UserId, UserPreferenceEmbedding, ZoneId,
};
pub use embedder::{HashingEmbedder, KeywordEmbedder};
pub use error::{Error, ErrorKind, Result};
pub use filter::{keyword_terms, AdFilter, Filter, FilterCondition};
pub use geo::{BoundingBox, GeoPoint, Geometry};
pub use hnsw::HnswIndex;
pub use ranking::{exact_top_k, ranking_order, RankedCandidate};
pub use store::{AuctionStore, CandidateStore, EligibilityIndex, PreferenceStore};
pub use vector::{Vector, EMBEDDING_DIM};
