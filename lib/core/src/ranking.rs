// Exact top-k ranking by cosine distance.
// Order is (distance ascending, ad id ascending) so equal distances rank deterministically.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::{AdId, Advertisement, Error, Result, Vector};

// Candidate sets at least this large are scored on the rayon pool
const PARALLEL_SCAN_THRESHOLD: usize = 4096;

/// One row of a similarity ranking, carrying the bid for the selector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub ad_id: AdId,
    pub distance: f32,
    pub bid_amount: f64,
}

impl RankedCandidate {
    pub fn new(ad_id: AdId, distance: f32, bid_amount: f64) -> Self {
        Self { ad_id, distance, bid_amount }
    }
}

/// Total order used for every ranking in the crate
#[inline]
pub fn ranking_order(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.ad_id.cmp(&b.ad_id))
}

/// Score one advertisement against the query, rejecting stored embeddings of the wrong size
#[inline]
pub fn score(ad: &Advertisement, query: &Vector) -> Result<RankedCandidate> {
    if ad.embedding.dim() != query.dim() {
        return Err(Error::Invariant(format!(
            "advertisement {} has a {}-dimensional embedding, query has {}",
            ad.id,
            ad.embedding.dim(),
            query.dim()
        )));
    }
    Ok(RankedCandidate::new(
        ad.id,
        ad.embedding.cosine_distance(query),
        ad.bid_amount,
    ))
}

/// Full scan over `candidates`, returning at most `k` rows in ranking order
pub fn exact_top_k(candidates: &[&Advertisement], query: &Vector, k: usize) -> Result<Vec<RankedCandidate>> {
    if k == 0 || candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut scored: Vec<RankedCandidate> = if candidates.len() >= PARALLEL_SCAN_THRESHOLD {
        candidates
            .par_iter()
            .map(|ad| score(ad, query))
            .collect::<Result<Vec<_>>>()?
    } else {
        candidates
            .iter()
            .map(|ad| score(ad, query))
            .collect::<Result<Vec<_>>>()?
    };

    if scored.len() > k {
        scored.select_nth_unstable_by(k - 1, ranking_order);
        scored.truncate(k);
    }
    scored.sort_unstable_by(ranking_order);
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewAdvertisement;

    fn ad(id: u64, bid: f64, embedding: Vec<f32>) -> Advertisement {
        NewAdvertisement::new(bid, Vector::new(embedding)).into_advertisement(AdId(id))
    }

    #[test]
    fn test_orders_by_distance() {
        let ads = vec![
            ad(1, 1.0, vec![0.0, 1.0]),
            ad(2, 1.0, vec![1.0, 0.0]),
            ad(3, 1.0, vec![1.0, 1.0]),
        ];
        let refs: Vec<&Advertisement> = ads.iter().collect();
        let ranked = exact_top_k(&refs, &Vector::new(vec![1.0, 0.0]), 10).unwrap();
        let ids: Vec<u64> = ranked.iter().map(|r| r.ad_id.0).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_truncates_and_breaks_ties_by_id() {
        let ads: Vec<Advertisement> = (1..=6).rev().map(|i| ad(i, 1.0, vec![1.0, 0.0])).collect();
        let refs: Vec<&Advertisement> = ads.iter().collect();
        let ranked = exact_top_k(&refs, &Vector::new(vec![1.0, 0.0]), 3).unwrap();
        let ids: Vec<u64> = ranked.iter().map(|r| r.ad_id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_candidates() {
        assert!(exact_top_k(&[], &Vector::new(vec![1.0]), 10).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_is_invariant_violation() {
        let ads = vec![ad(1, 1.0, vec![1.0, 0.0, 0.0])];
        let refs: Vec<&Advertisement> = ads.iter().collect();
        let err = exact_top_k(&refs, &Vector::new(vec![1.0, 0.0]), 10).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }
}
