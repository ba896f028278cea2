//! Uniform latitude/longitude grid over zone bounding boxes.
//!
//! A zone is registered in every cell its bounding box overlaps. A point query
//! reads exactly one cell, so the returned zones are only *candidates*: callers
//! must still check exact containment.

use ahash::AHashMap;
use geoauction_core::{BoundingBox, Error, GeoPoint, Result, ZoneId};

/// Zones spanning more cells than this are kept in a side list scanned on every query
const MAX_CELLS_PER_ZONE: usize = 1 << 16;

type Cell = (i32, i32);

#[derive(Debug, Clone)]
enum Placement {
    Cells(Vec<Cell>),
    Oversized,
}

#[derive(Debug, Clone)]
pub struct GeoGrid {
    cell_degrees: f64,
    cells: AHashMap<Cell, Vec<ZoneId>>,
    oversized: Vec<ZoneId>,
    placements: AHashMap<ZoneId, Placement>,
}

impl GeoGrid {
    pub fn new(cell_degrees: f64) -> Result<Self> {
        if !cell_degrees.is_finite() || cell_degrees <= 0.0 || cell_degrees > 180.0 {
            return Err(Error::InvalidConfig(format!(
                "grid cell size must be in (0, 180] degrees, got {}",
                cell_degrees
            )));
        }
        Ok(Self {
            cell_degrees,
            cells: AHashMap::new(),
            oversized: Vec::new(),
            placements: AHashMap::new(),
        })
    }

    #[inline]
    pub fn cell_degrees(&self) -> f64 {
        self.cell_degrees
    }

    #[inline]
    fn lat_index(&self, latitude: f64) -> i32 {
        ((latitude.clamp(-90.0, 90.0) + 90.0) / self.cell_degrees).floor() as i32
    }

    #[inline]
    fn lon_index(&self, longitude: f64) -> i32 {
        ((longitude.clamp(-180.0, 180.0) + 180.0) / self.cell_degrees).floor() as i32
    }

    #[inline]
    fn cell_of(&self, point: &GeoPoint) -> Cell {
        (self.lat_index(point.latitude), self.lon_index(point.longitude))
    }

    /// Register a zone under its bounding box, replacing any earlier placement
    pub fn insert(&mut self, zone_id: ZoneId, bbox: &BoundingBox) {
        self.remove(zone_id);

        let lat_range = self.lat_index(bbox.min_lat)..=self.lat_index(bbox.max_lat);
        let lon_range = self.lon_index(bbox.min_lon)..=self.lon_index(bbox.max_lon);
        let span = lat_range.clone().count() * lon_range.clone().count();

        if span > MAX_CELLS_PER_ZONE {
            self.oversized.push(zone_id);
            self.placements.insert(zone_id, Placement::Oversized);
            return;
        }

        let mut placed = Vec::with_capacity(span);
        for lat in lat_range {
            for lon in lon_range.clone() {
                self.cells.entry((lat, lon)).or_default().push(zone_id);
                placed.push((lat, lon));
            }
        }
        self.placements.insert(zone_id, Placement::Cells(placed));
    }

    /// Unregister a zone; returns false if it was not present
    pub fn remove(&mut self, zone_id: ZoneId) -> bool {
        match self.placements.remove(&zone_id) {
            Some(Placement::Cells(cells)) => {
                for cell in cells {
                    if let Some(zones) = self.cells.get_mut(&cell) {
                        zones.retain(|z| *z != zone_id);
                        if zones.is_empty() {
                            self.cells.remove(&cell);
                        }
                    }
                }
                true
            }
            Some(Placement::Oversized) => {
                self.oversized.retain(|z| *z != zone_id);
                true
            }
            None => false,
        }
    }

    /// Zones whose bounding box may contain `point`
    pub fn candidates<'a>(&'a self, point: &GeoPoint) -> impl Iterator<Item = ZoneId> + 'a {
        let cell = self.cells.get(&self.cell_of(point));
        cell.into_iter()
            .flatten()
            .chain(self.oversized.iter())
            .copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.placements.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.oversized.clear();
        self.placements.clear();
    }
}
