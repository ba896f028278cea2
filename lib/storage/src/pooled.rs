use async_trait::async_trait;
use geoauction_core::{
    AdFilter, AdId, CandidateStore, EligibilityIndex, GeoPoint, PreferenceStore,
    RankedCandidate, Result, UserId, Vector,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::catalog::MemoryCatalog;
use crate::pool::{Pool, PoolConfig, PoolStatus};

/// One checked-out handle on the catalog
#[derive(Debug, Clone)]
pub struct CatalogSession {
    id: u64,
    catalog: Arc<MemoryCatalog>,
}

impl CatalogSession {
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// The catalog behind a bounded session pool.
///
/// Every collaborator query holds a session for its duration, so at most
/// `max_size` queries touch storage at once and the rest wait up to the
/// acquisition timeout.
#[derive(Debug)]
pub struct PooledStore {
    catalog: Arc<MemoryCatalog>,
    pool: Pool<CatalogSession>,
}

impl PooledStore {
    pub fn new(catalog: Arc<MemoryCatalog>, config: PoolConfig) -> Result<Self> {
        let next_id = AtomicU64::new(1);
        let handle = catalog.clone();
        let pool = Pool::new(config, move || {
            Ok(CatalogSession {
                id: next_id.fetch_add(1, Ordering::Relaxed),
                catalog: handle.clone(),
            })
        })?;
        Ok(Self { catalog, pool })
    }

    /// Direct access for catalog administration, outside the pool
    #[inline]
    pub fn catalog(&self) -> &Arc<MemoryCatalog> {
        &self.catalog
    }

    #[inline]
    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    pub fn close(&self) {
        self.pool.close();
    }
}

#[async_trait]
impl PreferenceStore for PooledStore {
    async fn preference_embedding(&self, user_id: &UserId) -> Result<Option<Vector>> {
        let session = self.pool.acquire().await?;
        Ok(session.catalog.preference_embedding(user_id))
    }
}

#[async_trait]
impl EligibilityIndex for PooledStore {
    async fn find_eligible(&self, point: GeoPoint, filter: Option<&AdFilter>) -> Result<BTreeSet<AdId>> {
        let session = self.pool.acquire().await?;
        session.catalog.find_eligible(point, filter)
    }
}

#[async_trait]
impl CandidateStore for PooledStore {
    async fn nearest_neighbors(
        &self,
        candidates: &BTreeSet<AdId>,
        query: &Vector,
        k: usize,
    ) -> Result<Vec<RankedCandidate>> {
        let session = self.pool.acquire().await?;
        session.catalog.nearest_neighbors(candidates, query, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogConfig;
    use geoauction_core::{Error, NewAdvertisement, NewGeoZone};
    use std::time::Duration;

    fn store(max_size: usize) -> PooledStore {
        let catalog = Arc::new(
            MemoryCatalog::new(CatalogConfig {
                embedding_dim: 2,
                ..Default::default()
            })
            .unwrap(),
        );
        PooledStore::new(
            catalog,
            PoolConfig {
                max_size,
                min_size: 1,
                acquire_timeout: Duration::from_millis(20),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_queries_go_through_pool() {
        let store = store(2);
        let id = store
            .catalog()
            .create_advertisement(NewAdvertisement::new(1.0, Vector::new(vec![1.0, 0.0])))
            .unwrap();
        store
            .catalog()
            .add_zone(id, NewGeoZone::circle("here", GeoPoint::new(1.0, 1.0), 1_000.0))
            .unwrap();

        let eligible = store.find_eligible(GeoPoint::new(1.0, 1.0), None).await.unwrap();
        let ranked = store
            .nearest_neighbors(&eligible, &Vector::new(vec![1.0, 0.0]), 10)
            .await
            .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].ad_id, id);

        let status = store.pool_status();
        assert_eq!(status.in_use, 0);
        assert_eq!(status.size, 1);
    }

    #[tokio::test]
    async fn test_exhausted_pool_surfaces_transient_error() {
        let store = store(1);
        let _held = store.pool.acquire().await.unwrap();
        let err = store
            .preference_embedding(&UserId::from("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PoolExhausted { .. }));
    }

    #[tokio::test]
    async fn test_closed_store_is_unavailable() {
        let store = store(1);
        store.close();
        let err = store
            .find_eligible(GeoPoint::new(0.0, 0.0), None)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
