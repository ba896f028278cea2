use geoauction_core::{ranking_order, AdId, CandidateStore, Error, RankedCandidate, Result, Vector};
use std::collections::BTreeSet;
use tracing::error;

/// Narrows an eligible set to the `k` candidates closest to the query embedding.
///
/// The store performs the nearest-neighbor search. Rows outside the eligible
/// set are an invariant violation, and the output is always re-sorted by
/// (distance, ad id).
#[derive(Debug, Clone, Copy)]
pub struct SimilarityRanker {
    k: usize,
}

impl SimilarityRanker {
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    pub async fn rank<S>(
        &self,
        store: &S,
        candidates: &BTreeSet<AdId>,
        query: &Vector,
    ) -> Result<Vec<RankedCandidate>>
    where
        S: CandidateStore + ?Sized,
    {
        if candidates.is_empty() || self.k == 0 {
            return Ok(Vec::new());
        }

        let mut ranked = store.nearest_neighbors(candidates, query, self.k).await?;

        let mut seen = BTreeSet::new();
        for row in &ranked {
            if !candidates.contains(&row.ad_id) || !seen.insert(row.ad_id) {
                error!(ad_id = %row.ad_id, "ranking returned an ad outside the eligible set");
                return Err(Error::Invariant(format!(
                    "ranking returned ad {} that is not a distinct eligible candidate",
                    row.ad_id
                )));
            }
            if !row.distance.is_finite() || !row.bid_amount.is_finite() {
                error!(ad_id = %row.ad_id, "ranking returned a non-finite distance or bid");
                return Err(Error::Invariant(format!(
                    "ranking row for ad {} is not finite",
                    row.ad_id
                )));
            }
        }

        ranked.sort_unstable_by(ranking_order);
        ranked.truncate(self.k);
        Ok(ranked)
    }
}
