use chrono::Utc;
use geoauction_core::{
    keyword_terms, AdFilter, AdId, AuctionStore, Error, FilterCondition, KeywordEmbedder, Result,
    Vector,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::{EngineConfig, MissingEmbeddingPolicy};
use crate::ranker::SimilarityRanker;
use crate::request::AuctionRequest;
use crate::selector::AuctionSelector;

/// Progress of one resolution. Every returned outcome is terminal; `stage`
/// records the last stage completed before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStage {
    Start,
    EmbeddingResolved,
    EligibilityFiltered,
    Ranked,
    WinnerSelected,
}

/// Why an auction legitimately ended without a winner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoWinnerReason {
    NoPreferenceEmbedding,
    NoEligibleAds,
    EmptyRanking,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionResult {
    Winner {
        ad_id: AdId,
        bid_amount: f64,
        distance: f32,
        runner_up: Option<AdId>,
    },
    NoWinner(NoWinnerReason),
}

impl AuctionResult {
    #[inline]
    pub fn winner(&self) -> Option<AdId> {
        match self {
            AuctionResult::Winner { ad_id, .. } => Some(*ad_id),
            AuctionResult::NoWinner(_) => None,
        }
    }

    #[inline]
    pub fn is_no_winner(&self) -> bool {
        matches!(self, AuctionResult::NoWinner(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuctionOutcome {
    pub result: AuctionResult,
    pub stage: ResolutionStage,
    pub eligible_count: usize,
    pub ranked_count: usize,
}

impl AuctionOutcome {
    fn no_winner(reason: NoWinnerReason, stage: ResolutionStage, eligible_count: usize) -> Self {
        Self {
            result: AuctionResult::NoWinner(reason),
            stage,
            eligible_count,
            ranked_count: 0,
        }
    }
}

/// Resolves one auction request against an [`AuctionStore`].
///
/// Resolution is linear: preference embedding, geo eligibility, similarity
/// ranking, bid selection. Expected-empty conditions end in
/// [`AuctionResult::NoWinner`]; storage failures and invariant violations are
/// returned as errors to the caller of that one request.
pub struct AuctionEngine<S: ?Sized> {
    store: Arc<S>,
    config: EngineConfig,
    embedder: Option<Arc<dyn KeywordEmbedder>>,
    ranker: SimilarityRanker,
    selector: AuctionSelector,
}

impl<S: ?Sized> Clone for AuctionEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            embedder: self.embedder.clone(),
            ranker: self.ranker,
            selector: self.selector,
        }
    }
}

impl<S: AuctionStore + ?Sized> AuctionEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            ranker: SimilarityRanker::new(config.top_k),
            selector: AuctionSelector,
            embedder: None,
            config,
        })
    }

    /// Embed request keywords when present instead of using the cached preference
    pub fn with_embedder(mut self, embedder: Arc<dyn KeywordEmbedder>) -> Result<Self> {
        if embedder.dim() != self.config.embedding_dim {
            return Err(Error::InvalidDimension {
                expected: self.config.embedding_dim,
                actual: embedder.dim(),
            });
        }
        self.embedder = Some(embedder);
        Ok(self)
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Resolve, giving up once `deadline` passes. In-flight storage calls are
    /// dropped and the result is [`Error::DeadlineExceeded`].
    pub async fn resolve_until(&self, request: &AuctionRequest, deadline: Instant) -> Result<AuctionOutcome> {
        match tokio::time::timeout_at(deadline, self.resolve(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(requester = %request.requester_id, "auction deadline exceeded");
                Err(Error::DeadlineExceeded)
            }
        }
    }

    pub async fn resolve_within(&self, request: &AuctionRequest, timeout: Duration) -> Result<AuctionOutcome> {
        self.resolve_until(request, Instant::now() + timeout).await
    }

    pub async fn resolve(&self, request: &AuctionRequest) -> Result<AuctionOutcome> {
        request.validate(self.config.embedding_dim)?;
        let method = request.selection_method()?;

        let outcome = self.run(request, method).await;
        match &outcome {
            Ok(outcome) => debug!(
                requester = %request.requester_id,
                winner = ?outcome.result.winner(),
                stage = ?outcome.stage,
                eligible = outcome.eligible_count,
                ranked = outcome.ranked_count,
                "auction resolved"
            ),
            Err(e @ Error::Invariant(_)) => {
                error!(requester = %request.requester_id, error = %e, "auction invariant violated")
            }
            Err(e) if e.is_transient() => {
                warn!(requester = %request.requester_id, error = %e, "auction storage failure")
            }
            Err(_) => {}
        }
        outcome
    }

    async fn run(&self, request: &AuctionRequest, method: crate::SelectionMethod) -> Result<AuctionOutcome> {
        // Start -> EmbeddingResolved
        let Some(query) = self.query_embedding(request).await? else {
            debug!(requester = %request.requester_id, "no preference embedding");
            return Ok(AuctionOutcome::no_winner(
                NoWinnerReason::NoPreferenceEmbedding,
                ResolutionStage::Start,
                0,
            ));
        };
        if query.dim() != self.config.embedding_dim {
            return Err(Error::Invariant(format!(
                "query embedding has {} dimensions, engine expects {}",
                query.dim(),
                self.config.embedding_dim
            )));
        }

        // EmbeddingResolved -> EligibilityFiltered
        let filter = self.candidate_filter(request);
        let eligible = self
            .store
            .find_eligible(request.point(), filter.as_ref())
            .await?;
        debug!(eligible = eligible.len(), "eligibility filtered");
        if eligible.is_empty() {
            return Ok(AuctionOutcome::no_winner(
                NoWinnerReason::NoEligibleAds,
                ResolutionStage::EligibilityFiltered,
                0,
            ));
        }

        // EligibilityFiltered -> Ranked
        let ranked = self.ranker.rank(&*self.store, &eligible, &query).await?;
        debug!(ranked = ranked.len(), "candidates ranked");

        // Ranked -> WinnerSelected
        let Some(selection) = self.selector.select(method, &ranked) else {
            return Ok(AuctionOutcome::no_winner(
                NoWinnerReason::EmptyRanking,
                ResolutionStage::Ranked,
                eligible.len(),
            ));
        };

        Ok(AuctionOutcome {
            result: AuctionResult::Winner {
                ad_id: selection.winner.ad_id,
                bid_amount: selection.winner.bid_amount,
                distance: selection.winner.distance,
                runner_up: selection.runner_up.map(|r| r.ad_id),
            },
            stage: ResolutionStage::WinnerSelected,
            eligible_count: eligible.len(),
            ranked_count: ranked.len(),
        })
    }

    /// Explicit embedding, then keyword embedding, then cached preference, then policy
    async fn query_embedding(&self, request: &AuctionRequest) -> Result<Option<Vector>> {
        if let Some(embedding) = &request.query_embedding {
            return Ok(Some(embedding.clone()));
        }

        if let Some(embedder) = &self.embedder {
            if !request.positive_keywords.trim().is_empty() {
                let embedding = embedder.embed(&request.positive_keywords, &request.negative_keywords)?;
                return Ok(Some(embedding));
            }
        }

        if let Some(embedding) = self.store.preference_embedding(&request.requester_id).await? {
            return Ok(Some(embedding));
        }

        Ok(match self.config.missing_embedding {
            MissingEmbeddingPolicy::NoWinner => None,
            MissingEmbeddingPolicy::Neutral => Some(Vector::zeros(self.config.embedding_dim)),
        })
    }

    fn candidate_filter(&self, request: &AuctionRequest) -> Option<AdFilter> {
        let mut conditions = Vec::new();

        if self.config.enforce_active_window {
            conditions.push(FilterCondition::ActiveAt(Utc::now()));
        }
        let excluded = keyword_terms(&request.negative_keywords);
        if !excluded.is_empty() {
            conditions.push(FilterCondition::ExcludeTerms(excluded));
        }
        let requested = keyword_terms(&request.positive_keywords);
        if !requested.is_empty() {
            conditions.push(FilterCondition::RequestTerms(requested));
        }

        match conditions.len() {
            0 => None,
            1 => conditions.pop().map(AdFilter::new),
            _ => Some(AdFilter::new(FilterCondition::And(conditions))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use geoauction_core::{
        AdFilter, CandidateStore, EligibilityIndex, GeoPoint, HashingEmbedder, NewAdvertisement,
        NewGeoZone, PreferenceStore, RankedCandidate, UserId, UserPreferenceEmbedding,
    };
    use geoauction_storage::{CatalogConfig, MemoryCatalog, PoolConfig, PooledStore};
    use std::collections::BTreeSet;

    const DIM: usize = 4;
    const USER: &str = "1534556";
    const TIMES_SQUARE: (f64, f64) = (40.758, -73.9855);

    fn axis(i: usize) -> Vector {
        let mut v = vec![0.0; DIM];
        v[i] = 1.0;
        Vector::new(v)
    }

    fn blend(a: f32, b: f32) -> Vector {
        Vector::new(vec![a, b, 0.0, 0.0])
    }

    struct Fixture {
        catalog: Arc<MemoryCatalog>,
        engine: AuctionEngine<PooledStore>,
    }

    impl Fixture {
        fn new(config: EngineConfig) -> Self {
            let catalog = Arc::new(
                MemoryCatalog::new(CatalogConfig {
                    embedding_dim: DIM,
                    ..Default::default()
                })
                .unwrap(),
            );
            let store = Arc::new(PooledStore::new(catalog.clone(), PoolConfig::default()).unwrap());
            let engine = AuctionEngine::new(
                store,
                EngineConfig {
                    embedding_dim: DIM,
                    ..config
                },
            )
            .unwrap();
            Self { catalog, engine }
        }

        fn with_preference(self, embedding: Vector) -> Self {
            self.catalog
                .put_preference(UserPreferenceEmbedding {
                    user_id: UserId::from(USER),
                    keywords: String::new(),
                    embedding,
                })
                .unwrap();
            self
        }

        fn ad_at(&self, bid: f64, embedding: Vector, (lat, lon): (f64, f64)) -> AdId {
            let id = self
                .catalog
                .create_advertisement(NewAdvertisement::new(bid, embedding))
                .unwrap();
            self.catalog
                .add_zone(id, NewGeoZone::circle("zone", GeoPoint::new(lat, lon), 5_000.0))
                .unwrap();
            id
        }

        async fn resolve(&self, request: &AuctionRequest) -> AuctionOutcome {
            self.engine.resolve(request).await.unwrap()
        }
    }

    fn request() -> AuctionRequest {
        AuctionRequest::new(USER, TIMES_SQUARE.0, TIMES_SQUARE.1)
    }

    #[tokio::test]
    async fn test_no_cached_embedding_is_no_winner() {
        let fx = Fixture::new(EngineConfig::default());
        fx.ad_at(5.0, axis(0), TIMES_SQUARE);

        let outcome = fx.resolve(&request()).await;
        assert_eq!(outcome.result, AuctionResult::NoWinner(NoWinnerReason::NoPreferenceEmbedding));
        assert_eq!(outcome.stage, ResolutionStage::Start);
    }

    #[tokio::test]
    async fn test_neutral_policy_ranks_by_id() {
        let fx = Fixture::new(EngineConfig {
            missing_embedding: MissingEmbeddingPolicy::Neutral,
            top_k: 2,
            ..Default::default()
        });
        let first = fx.ad_at(1.0, axis(0), TIMES_SQUARE);
        let second = fx.ad_at(2.0, axis(1), TIMES_SQUARE);
        fx.ad_at(9.0, axis(2), TIMES_SQUARE);

        let outcome = fx.resolve(&request()).await;
        assert_eq!(outcome.result.winner(), Some(second));
        assert_eq!(outcome.eligible_count, 3);
        assert_eq!(outcome.ranked_count, 2);
        match outcome.result {
            AuctionResult::Winner { runner_up, distance, .. } => {
                assert_eq!(runner_up, Some(first));
                assert!((distance - 1.0).abs() < 1e-6);
            }
            other => panic!("expected a winner, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_eligible_ad_wins() {
        let fx = Fixture::new(EngineConfig::default()).with_preference(axis(0));
        let only = fx.ad_at(0.5, axis(1), TIMES_SQUARE);

        let outcome = fx.resolve(&request()).await;
        assert_eq!(outcome.result.winner(), Some(only));
        assert_eq!(outcome.stage, ResolutionStage::WinnerSelected);
    }

    #[tokio::test]
    async fn test_outcome_stage_is_last_completed() {
        let fx = Fixture::new(EngineConfig::default());
        fx.ad_at(1.0, axis(0), TIMES_SQUARE);
        let missing = fx.resolve(&request()).await;

        let fx = fx.with_preference(axis(0));
        let remote = fx.resolve(&AuctionRequest::new(USER, -75.0, 120.0)).await;
        let won = fx.resolve(&request()).await;

        let stages: Vec<String> = [missing.stage, remote.stage, won.stage]
            .iter()
            .map(|s| serde_json::to_string(s).unwrap())
            .collect();
        assert_eq!(stages, ["\"start\"", "\"eligibility_filtered\"", "\"winner_selected\""]);
        assert!(missing.stage < remote.stage && remote.stage < won.stage);
    }

    #[tokio::test]
    async fn test_higher_bid_wins() {
        let fx = Fixture::new(EngineConfig::default()).with_preference(axis(0));
        let low = fx.ad_at(3.0, blend(1.0, 0.0), TIMES_SQUARE);
        let high = fx.ad_at(5.0, blend(0.8, 0.6), TIMES_SQUARE);

        let outcome = fx.resolve(&request()).await;
        match outcome.result {
            AuctionResult::Winner { ad_id, bid_amount, runner_up, .. } => {
                assert_eq!(ad_id, high);
                assert_eq!(bid_amount, 5.0);
                assert_eq!(runner_up, Some(low));
            }
            other => panic!("expected a winner, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remote_point_is_no_winner() {
        let fx = Fixture::new(EngineConfig::default()).with_preference(axis(0));
        fx.ad_at(5.0, axis(0), TIMES_SQUARE);

        let remote = AuctionRequest::new(USER, -75.0, 120.0);
        let outcome = fx.resolve(&remote).await;
        assert_eq!(outcome.result, AuctionResult::NoWinner(NoWinnerReason::NoEligibleAds));
        assert_eq!(outcome.stage, ResolutionStage::EligibilityFiltered);
    }

    #[tokio::test]
    async fn test_winner_comes_from_top_k() {
        let fx = Fixture::new(EngineConfig {
            top_k: 2,
            ..Default::default()
        })
        .with_preference(axis(0));
        let close = fx.ad_at(1.0, blend(1.0, 0.05), TIMES_SQUARE);
        let closer = fx.ad_at(2.0, blend(1.0, 0.0), TIMES_SQUARE);
        // Highest bid overall but least similar
        fx.ad_at(100.0, axis(3), TIMES_SQUARE);

        let outcome = fx.resolve(&request()).await;
        assert_eq!(outcome.ranked_count, 2);
        match outcome.result {
            AuctionResult::Winner { ad_id, runner_up, .. } => {
                assert_eq!(ad_id, closer);
                assert_eq!(runner_up, Some(close));
            }
            other => panic!("expected a winner, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bid_ties_and_repeat_resolution_are_deterministic() {
        let fx = Fixture::new(EngineConfig::default()).with_preference(axis(0));
        let ids: Vec<AdId> = (0..4)
            .map(|i| fx.ad_at(7.0, blend(1.0, 0.1 * i as f32), TIMES_SQUARE))
            .collect();

        let first = fx.resolve(&request()).await;
        for _ in 0..5 {
            assert_eq!(fx.resolve(&request()).await, first);
        }
        assert_eq!(first.result.winner(), Some(ids[0]));
    }

    #[tokio::test]
    async fn test_explicit_embedding_overrides_preference() {
        let fx = Fixture::new(EngineConfig {
            top_k: 1,
            ..Default::default()
        })
        .with_preference(axis(0));
        fx.ad_at(9.0, axis(0), TIMES_SQUARE);
        let other = fx.ad_at(1.0, axis(1), TIMES_SQUARE);

        let outcome = fx.resolve(&request().with_query_embedding(axis(1))).await;
        assert_eq!(outcome.result.winner(), Some(other));
    }

    #[tokio::test]
    async fn test_keyword_filters() {
        let fx = Fixture::new(EngineConfig::default()).with_preference(axis(0));
        let casino = fx
            .catalog
            .create_advertisement(
                NewAdvertisement::new(50.0, axis(0)).with_keywords("casino poker", "children"),
            )
            .unwrap();
        fx.catalog
            .add_zone(casino, NewGeoZone::circle("strip", GeoPoint::new(TIMES_SQUARE.0, TIMES_SQUARE.1), 1_000.0))
            .unwrap();
        let cafe = fx.ad_at(1.0, axis(0), TIMES_SQUARE);

        let excluded = fx.resolve(&request().with_keywords("", "poker")).await;
        assert_eq!(excluded.result.winner(), Some(cafe));

        let ad_negative = fx.resolve(&request().with_keywords("children toys", "")).await;
        assert_eq!(ad_negative.result.winner(), Some(cafe));

        let unfiltered = fx.resolve(&request()).await;
        assert_eq!(unfiltered.result.winner(), Some(casino));
    }

    #[tokio::test]
    async fn test_keyword_embedder() {
        let embedder = Arc::new(HashingEmbedder::new(DIM).unwrap());
        let fx = Fixture::new(EngineConfig::default());
        let engine = fx.engine.clone().with_embedder(embedder.clone()).unwrap();
        let id = fx.ad_at(1.0, embedder.embed("coffee", "").unwrap(), TIMES_SQUARE);

        // No cached preference: keywords alone drive the ranking
        let outcome = engine
            .resolve(&request().with_keywords("coffee", ""))
            .await
            .unwrap();
        assert_eq!(outcome.result.winner(), Some(id));

        let wrong_dim = fx.engine.clone().with_embedder(Arc::new(HashingEmbedder::new(DIM + 1).unwrap()));
        assert!(wrong_dim.is_err());
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_storage() {
        let fx = Fixture::new(EngineConfig::default()).with_preference(axis(0));
        let err = fx
            .engine
            .resolve(&AuctionRequest::new(USER, 0.0, 200.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCoordinates { .. }));
    }

    #[tokio::test]
    async fn test_enforced_active_window() {
        let fx = Fixture::new(EngineConfig {
            enforce_active_window: true,
            ..Default::default()
        })
        .with_preference(axis(0));
        let expired = fx
            .catalog
            .create_advertisement(
                NewAdvertisement::new(10.0, axis(0))
                    .with_active_window(None, Some(Utc::now() - chrono::Duration::days(1))),
            )
            .unwrap();
        fx.catalog
            .add_zone(expired, NewGeoZone::circle("z", GeoPoint::new(TIMES_SQUARE.0, TIMES_SQUARE.1), 1_000.0))
            .unwrap();

        let outcome = fx.resolve(&request()).await;
        assert_eq!(outcome.result, AuctionResult::NoWinner(NoWinnerReason::NoEligibleAds));
    }

    /// Store whose calls can be made slow, failing, or inconsistent
    #[derive(Default)]
    struct ScriptedStore {
        eligibility_delay: Option<Duration>,
        unavailable: bool,
        ranking: Vec<RankedCandidate>,
    }

    #[async_trait]
    impl PreferenceStore for ScriptedStore {
        async fn preference_embedding(&self, _user_id: &UserId) -> Result<Option<Vector>> {
            if self.unavailable {
                return Err(Error::Unavailable("connection refused".into()));
            }
            Ok(Some(axis(0)))
        }
    }

    #[async_trait]
    impl EligibilityIndex for ScriptedStore {
        async fn find_eligible(&self, _point: GeoPoint, _filter: Option<&AdFilter>) -> Result<BTreeSet<AdId>> {
            if let Some(delay) = self.eligibility_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(BTreeSet::from([AdId(1)]))
        }
    }

    #[async_trait]
    impl CandidateStore for ScriptedStore {
        async fn nearest_neighbors(
            &self,
            _candidates: &BTreeSet<AdId>,
            _query: &Vector,
            _k: usize,
        ) -> Result<Vec<RankedCandidate>> {
            Ok(self.ranking.clone())
        }
    }

    fn scripted(store: ScriptedStore) -> AuctionEngine<ScriptedStore> {
        AuctionEngine::new(
            Arc::new(store),
            EngineConfig {
                embedding_dim: DIM,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let engine = scripted(ScriptedStore {
            eligibility_delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let err = engine
            .resolve_within(&request(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_storage_failure_is_not_no_winner() {
        let engine = scripted(ScriptedStore {
            unavailable: true,
            ..Default::default()
        });
        let err = engine.resolve(&request()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_empty_ranking_is_no_winner() {
        let engine = scripted(ScriptedStore::default());
        let outcome = engine.resolve(&request()).await.unwrap();
        assert_eq!(outcome.result, AuctionResult::NoWinner(NoWinnerReason::EmptyRanking));
        assert_eq!(outcome.eligible_count, 1);
    }

    #[tokio::test]
    async fn test_inconsistent_ranking_is_an_invariant_violation() {
        let engine = scripted(ScriptedStore {
            ranking: vec![RankedCandidate::new(AdId(2), 0.0, 1.0)],
            ..Default::default()
        });
        let err = engine.resolve(&request()).await.unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }
}
