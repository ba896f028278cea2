//! What the auction engine needs from persistent storage.
//!
//! Each trait is one query of the storage collaborator. Implementations must be
//! safe to call concurrently from independent requests and must report
//! unreachable storage as [`Error::Unavailable`](crate::Error::Unavailable) or
//! [`Error::PoolExhausted`](crate::Error::PoolExhausted), never as an empty answer.

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::{AdFilter, AdId, GeoPoint, RankedCandidate, Result, UserId, Vector};

/// Keyed lookup from user id to cached preference embedding
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// `Ok(None)` when the user has no cached embedding
    async fn preference_embedding(&self, user_id: &UserId) -> Result<Option<Vector>>;
}

/// Geo-containment query
#[async_trait]
pub trait EligibilityIndex: Send + Sync {
    /// Ids of advertisements with at least one zone containing `point`,
    /// restricted to those accepted by `filter` when one is given
    async fn find_eligible(&self, point: GeoPoint, filter: Option<&AdFilter>) -> Result<BTreeSet<AdId>>;
}

/// Vector similarity query with the bid amount of each row
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// At most `k` members of `candidates`, ordered by (distance, id) ascending
    async fn nearest_neighbors(
        &self,
        candidates: &BTreeSet<AdId>,
        query: &Vector,
        k: usize,
    ) -> Result<Vec<RankedCandidate>>;
}

/// Everything one auction resolution reads
pub trait AuctionStore: PreferenceStore + EligibilityIndex + CandidateStore {}

impl<T> AuctionStore for T where T: PreferenceStore + EligibilityIndex + CandidateStore {}
