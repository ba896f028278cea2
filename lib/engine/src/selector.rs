use geoauction_core::{AdId, RankedCandidate};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;

use crate::request::SelectionMethod;

/// The winning row and, when there is one, the next-best bidder
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub winner: RankedCandidate,
    /// Exposed for a future second-price mechanism; never used for pricing here
    pub runner_up: Option<RankedCandidate>,
}

/// Pure winner selection over an already ranked, already capped sequence
#[derive(Debug, Clone, Copy, Default)]
pub struct AuctionSelector;

impl AuctionSelector {
    pub fn select(&self, method: SelectionMethod, ranked: &[RankedCandidate]) -> Option<Selection> {
        match method {
            SelectionMethod::HighestBid => highest_bid(ranked),
        }
    }
}

#[inline]
fn bid_order(row: &RankedCandidate) -> (Reverse<OrderedFloat<f64>>, AdId) {
    (Reverse(OrderedFloat(row.bid_amount)), row.ad_id)
}

fn highest_bid(ranked: &[RankedCandidate]) -> Option<Selection> {
    let winner = *ranked.iter().min_by_key(|row| bid_order(row))?;
    let runner_up = ranked
        .iter()
        .filter(|row| row.ad_id != winner.ad_id)
        .min_by_key(|row| bid_order(row))
        .copied();
    Some(Selection { winner, runner_up })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u64, bid: f64) -> RankedCandidate {
        RankedCandidate::new(AdId(id), 0.1 * id as f32, bid)
    }

    fn select(rows: &[RankedCandidate]) -> Option<Selection> {
        AuctionSelector.select(SelectionMethod::HighestBid, rows)
    }

    #[test]
    fn test_empty_is_no_winner() {
        assert!(select(&[]).is_none());
    }

    #[test]
    fn test_single_candidate_wins() {
        let selection = select(&[row(4, 0.0)]).unwrap();
        assert_eq!(selection.winner.ad_id, AdId(4));
        assert!(selection.runner_up.is_none());
    }

    #[test]
    fn test_highest_bid_wins_regardless_of_rank() {
        let selection = select(&[row(1, 3.0), row(2, 5.0)]).unwrap();
        assert_eq!(selection.winner.ad_id, AdId(2));
        assert_eq!(selection.runner_up.map(|r| r.ad_id), Some(AdId(1)));
    }

    #[test]
    fn test_ties_go_to_lowest_id() {
        let rows = [row(7, 5.0), row(3, 5.0), row(5, 5.0), row(1, 2.0)];
        let selection = select(&rows).unwrap();
        assert_eq!(selection.winner.ad_id, AdId(3));
        assert_eq!(selection.runner_up.map(|r| r.ad_id), Some(AdId(5)));

        let mut reversed = rows;
        reversed.reverse();
        assert_eq!(select(&reversed), Some(selection));
    }
}
