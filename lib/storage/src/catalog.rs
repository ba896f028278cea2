use ahash::AHashMap;
use chrono::Utc;
use geoauction_core::ranking::score;
use geoauction_core::simd::norm_simd;
use geoauction_core::{
    exact_top_k, ranking_order, AdFilter, AdGeoZone, AdId, Advertisement, Error, Filter,
    GeoPoint, HnswIndex, NewAdvertisement, NewGeoZone, RankedCandidate, Result, UserId,
    UserPreferenceEmbedding, Vector, ZoneId, EMBEDDING_DIM,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, error, info};

use crate::persistence::CatalogSnapshot;
use crate::spatial::GeoGrid;

/// Configuration for a catalog
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub embedding_dim: usize,
    pub grid_cell_degrees: f64,
    /// Candidate sets up to this size are ranked by full scan
    pub exact_scan_threshold: usize,
    pub hnsw_max_connections: usize,
    pub hnsw_max_layers: usize,
    pub hnsw_ef_search: usize,
    /// Rebuild the HNSW graph once this fraction of its nodes are tombstones
    pub rebuild_tombstone_ratio: f32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            embedding_dim: EMBEDDING_DIM,
            grid_cell_degrees: 1.0,
            exact_scan_threshold: 2048,
            hnsw_max_connections: 16,
            hnsw_max_layers: 16,
            hnsw_ef_search: 64,
            rebuild_tombstone_ratio: 0.25,
        }
    }
}

impl CatalogConfig {
    pub fn validate(&self) -> Result<()> {
        if self.embedding_dim == 0 {
            return Err(Error::InvalidConfig(
                "embedding dimension must be positive".to_string(),
            ));
        }
        if !(self.rebuild_tombstone_ratio > 0.0 && self.rebuild_tombstone_ratio <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "rebuild tombstone ratio must be in (0, 1], got {}",
                self.rebuild_tombstone_ratio
            )));
        }
        if self.hnsw_ef_search == 0 {
            return Err(Error::InvalidConfig("hnsw ef_search must be positive".to_string()));
        }
        GeoGrid::new(self.grid_cell_degrees).map(|_| ())
    }
}

struct CatalogState {
    ads: BTreeMap<AdId, Advertisement>,
    zones: BTreeMap<ZoneId, AdGeoZone>,
    zones_by_ad: AHashMap<AdId, BTreeSet<ZoneId>>,
    preferences: AHashMap<UserId, UserPreferenceEmbedding>,
    grid: GeoGrid,
    next_ad_id: u64,
    next_zone_id: u64,
}

impl CatalogState {
    fn insert_zone(&mut self, zone: AdGeoZone) {
        self.grid.insert(zone.id, &zone.region().bounding_box());
        self.zones_by_ad.entry(zone.ad_id).or_default().insert(zone.id);
        self.zones.insert(zone.id, zone);
    }

    fn remove_zone(&mut self, zone_id: ZoneId) -> Option<AdGeoZone> {
        let zone = self.zones.remove(&zone_id)?;
        self.grid.remove(zone_id);
        if let Some(ids) = self.zones_by_ad.get_mut(&zone.ad_id) {
            ids.remove(&zone_id);
            if ids.is_empty() {
                self.zones_by_ad.remove(&zone.ad_id);
            }
        }
        Some(zone)
    }
}

/// In-memory advertisement catalog: ads, their geo-zones and cached user preferences.
///
/// Lock order is `state` then `hnsw`.
pub struct MemoryCatalog {
    config: CatalogConfig,
    state: RwLock<CatalogState>,
    hnsw: RwLock<HnswIndex>,
}

impl fmt::Debug for MemoryCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCatalog")
            .field("config", self.config())
            .field("ads", &self.ad_count())
            .field("zones", &self.zone_count())
            .finish()
    }
}

impl MemoryCatalog {
    pub fn new(config: CatalogConfig) -> Result<Self> {
        config.validate()?;
        let grid = GeoGrid::new(config.grid_cell_degrees)?;
        let hnsw = HnswIndex::new(
            config.embedding_dim,
            config.hnsw_max_connections,
            config.hnsw_max_layers,
        );

        Ok(Self {
            state: RwLock::new(CatalogState {
                ads: BTreeMap::new(),
                zones: BTreeMap::new(),
                zones_by_ad: AHashMap::new(),
                preferences: AHashMap::new(),
                grid,
                next_ad_id: 1,
                next_zone_id: 1,
            }),
            hnsw: RwLock::new(hnsw),
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    #[inline]
    pub fn embedding_dim(&self) -> usize {
        self.config.embedding_dim
    }

    pub fn ad_count(&self) -> usize {
        self.state.read().ads.len()
    }

    pub fn zone_count(&self) -> usize {
        self.state.read().zones.len()
    }

    pub fn preference_count(&self) -> usize {
        self.state.read().preferences.len()
    }

    // ==================== Advertisements ====================

    pub fn create_advertisement(&self, new: NewAdvertisement) -> Result<AdId> {
        new.validate(self.config.embedding_dim)?;

        let mut state = self.state.write();
        let id = AdId(state.next_ad_id);
        state.next_ad_id += 1;

        self.hnsw.write().insert(id, &new.embedding)?;
        state.ads.insert(id, new.into_advertisement(id));

        info!(ad_id = %id, "advertisement created");
        Ok(id)
    }

    #[inline]
    pub fn get_advertisement(&self, id: AdId) -> Option<Advertisement> {
        self.state.read().ads.get(&id).cloned()
    }

    /// Replace every advertiser-supplied field, keeping the id and zones
    pub fn replace_advertisement(&self, id: AdId, new: NewAdvertisement) -> Result<Advertisement> {
        new.validate(self.config.embedding_dim)?;

        let mut state = self.state.write();
        if !state.ads.contains_key(&id) {
            return Err(Error::AdvertisementNotFound(id));
        }

        {
            let mut hnsw = self.hnsw.write();
            hnsw.insert(id, &new.embedding)?;
            self.maybe_rebuild(&mut hnsw)?;
        }
        let ad = new.into_advertisement(id);
        state.ads.insert(id, ad.clone());

        info!(ad_id = %id, "advertisement replaced");
        Ok(ad)
    }

    /// Delete an advertisement and, with it, all of its zones
    pub fn delete_advertisement(&self, id: AdId) -> Result<bool> {
        let mut state = self.state.write();
        if state.ads.remove(&id).is_none() {
            return Ok(false);
        }

        let zone_ids: Vec<ZoneId> = state
            .zones_by_ad
            .get(&id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        for zone_id in &zone_ids {
            state.remove_zone(*zone_id);
        }

        let mut hnsw = self.hnsw.write();
        hnsw.remove(id);
        self.maybe_rebuild(&mut hnsw)?;

        info!(ad_id = %id, zones_removed = zone_ids.len(), "advertisement deleted");
        Ok(true)
    }

    fn maybe_rebuild(&self, hnsw: &mut HnswIndex) -> Result<()> {
        let ratio = hnsw.tombstone_ratio();
        if ratio > self.config.rebuild_tombstone_ratio {
            debug!(tombstone_ratio = ratio, "rebuilding hnsw index");
            hnsw.rebuild().map_err(|e| {
                error!(error = %e, "hnsw rebuild failed");
                e
            })?;
        }
        Ok(())
    }

    // ==================== Geo zones ====================

    pub fn add_zone(&self, ad_id: AdId, new: NewGeoZone) -> Result<AdGeoZone> {
        let mut state = self.state.write();
        if !state.ads.contains_key(&ad_id) {
            return Err(Error::AdvertisementNotFound(ad_id));
        }

        let id = ZoneId(state.next_zone_id);
        let zone = new.into_zone(id, ad_id)?;
        state.next_zone_id += 1;
        state.insert_zone(zone.clone());

        info!(ad_id = %ad_id, zone_id = %id, place = %zone.place_name, "geo zone added");
        Ok(zone)
    }

    pub fn zones_for(&self, ad_id: AdId) -> Result<Vec<AdGeoZone>> {
        let state = self.state.read();
        if !state.ads.contains_key(&ad_id) {
            return Err(Error::AdvertisementNotFound(ad_id));
        }
        Ok(state
            .zones_by_ad
            .get(&ad_id)
            .into_iter()
            .flatten()
            .filter_map(|zone_id| state.zones.get(zone_id).cloned())
            .collect())
    }

    pub fn delete_zone(&self, zone_id: ZoneId) -> bool {
        let removed = self.state.write().remove_zone(zone_id).is_some();
        if removed {
            info!(zone_id = %zone_id, "geo zone deleted");
        }
        removed
    }

    // ==================== Preferences ====================

    /// Insert or replace the cached embedding of a user
    pub fn put_preference(&self, preference: UserPreferenceEmbedding) -> Result<()> {
        if preference.user_id.is_empty() {
            return Err(Error::InvalidInput("user id must not be empty".to_string()));
        }
        preference.embedding.validate(self.config.embedding_dim)?;

        debug!(user_id = %preference.user_id, "preference embedding stored");
        self.state
            .write()
            .preferences
            .insert(preference.user_id.clone(), preference);
        Ok(())
    }

    pub fn get_preference(&self, user_id: &UserId) -> Option<UserPreferenceEmbedding> {
        self.state.read().preferences.get(user_id).cloned()
    }

    pub fn delete_preference(&self, user_id: &UserId) -> bool {
        self.state.write().preferences.remove(user_id).is_some()
    }

    // ==================== Auction queries ====================

    pub fn preference_embedding(&self, user_id: &UserId) -> Option<Vector> {
        self.state
            .read()
            .preferences
            .get(user_id)
            .map(|p| p.embedding.clone())
    }

    /// Ids of ads with a zone containing `point` and accepted by `filter`
    pub fn find_eligible(&self, point: GeoPoint, filter: Option<&AdFilter>) -> Result<BTreeSet<AdId>> {
        point.validate()?;
        let state = self.state.read();

        let mut eligible = BTreeSet::new();
        for zone_id in state.grid.candidates(&point) {
            let Some(zone) = state.zones.get(&zone_id) else {
                return Err(Error::Invariant(format!(
                    "spatial grid references missing zone {}",
                    zone_id
                )));
            };
            if eligible.contains(&zone.ad_id) || !zone.contains(&point) {
                continue;
            }
            let Some(ad) = state.ads.get(&zone.ad_id) else {
                return Err(Error::Invariant(format!(
                    "zone {} references missing advertisement {}",
                    zone.id, zone.ad_id
                )));
            };
            if filter.map_or(true, |f| f.matches(ad)) {
                eligible.insert(ad.id);
            }
        }
        Ok(eligible)
    }

    /// Top-k of `candidates` by cosine distance to `query`, ordered by (distance, id)
    pub fn nearest_neighbors(
        &self,
        candidates: &BTreeSet<AdId>,
        query: &Vector,
        k: usize,
    ) -> Result<Vec<RankedCandidate>> {
        if k == 0 || candidates.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.state.read();

        // A zero query is equidistant from everything; only the exact scan orders that by id
        let indexed = candidates.len() > self.config.exact_scan_threshold
            && norm_simd(query.as_slice()) > 0.0;
        if indexed {
            let wanted = k.min(candidates.len());
            let hits = self.hnsw.read().search_filtered(
                query,
                k,
                Some(self.config.hnsw_ef_search.max(k)),
                |id| candidates.contains(&id),
            );

            if hits.len() >= wanted {
                // Re-score exactly so both paths agree on distances
                let mut ranked = hits
                    .iter()
                    .map(|(id, _)| {
                        state
                            .ads
                            .get(id)
                            .ok_or_else(|| {
                                Error::Invariant(format!("hnsw index references missing advertisement {}", id))
                            })
                            .and_then(|ad| score(ad, query))
                    })
                    .collect::<Result<Vec<_>>>()?;
                ranked.sort_unstable_by(ranking_order);
                return Ok(ranked);
            }
            debug!(
                hits = hits.len(),
                wanted, "hnsw returned too few candidates, falling back to exact scan"
            );
        }

        let ads = candidates
            .iter()
            .filter_map(|id| state.ads.get(id))
            .collect::<Vec<_>>();
        exact_top_k(&ads, query, k)
    }

    // ==================== Snapshots ====================

    pub fn snapshot(&self) -> CatalogSnapshot {
        let state = self.state.read();
        CatalogSnapshot {
            embedding_dim: self.config.embedding_dim,
            advertisements: state.ads.values().cloned().collect(),
            zones: state.zones.values().cloned().collect(),
            preferences: state.preferences.values().cloned().collect(),
            next_ad_id: state.next_ad_id,
            next_zone_id: state.next_zone_id,
            created_at: Utc::now(),
        }
    }

    /// Rebuild a catalog from a snapshot, re-validating every record
    pub fn from_snapshot(config: CatalogConfig, snapshot: CatalogSnapshot) -> Result<Self> {
        if snapshot.embedding_dim != config.embedding_dim {
            return Err(Error::InvalidDimension {
                expected: config.embedding_dim,
                actual: snapshot.embedding_dim,
            });
        }
        let catalog = Self::new(config)?;
        {
            let mut state = catalog.state.write();
            let mut hnsw = catalog.hnsw.write();

            for ad in snapshot.advertisements {
                ad.embedding.validate(catalog.config.embedding_dim)?;
                hnsw.insert(ad.id, &ad.embedding)?;
                state.next_ad_id = state.next_ad_id.max(ad.id.0 + 1);
                state.ads.insert(ad.id, ad);
            }

            for zone in snapshot.zones {
                if !state.ads.contains_key(&zone.ad_id) {
                    return Err(Error::Persistence(format!(
                        "zone {} references missing advertisement {}",
                        zone.id, zone.ad_id
                    )));
                }
                let restored = NewGeoZone {
                    place_name: zone.place_name,
                    latitude: zone.latitude,
                    longitude: zone.longitude,
                    radius_meters: zone.radius_meters,
                    geometry: zone.geometry,
                }
                .into_zone(zone.id, zone.ad_id)?;
                state.next_zone_id = state.next_zone_id.max(zone.id.0 + 1);
                state.insert_zone(restored);
            }

            for preference in snapshot.preferences {
                preference.embedding.validate(catalog.config.embedding_dim)?;
                state.preferences.insert(preference.user_id.clone(), preference);
            }

            state.next_ad_id = state.next_ad_id.max(snapshot.next_ad_id);
            state.next_zone_id = state.next_zone_id.max(snapshot.next_zone_id);
        }

        info!(
            ads = catalog.ad_count(),
            zones = catalog.zone_count(),
            preferences = catalog.preference_count(),
            "catalog restored from snapshot"
        );
        Ok(catalog)
    }
}
