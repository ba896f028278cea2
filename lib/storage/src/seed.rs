// JSON seed catalog loaded at startup
use geoauction_core::{AdId, Error, NewAdvertisement, NewGeoZone, Result, UserPreferenceEmbedding};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::catalog::MemoryCatalog;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedCatalog {
    #[serde(default)]
    pub advertisements: Vec<SeedAdvertisement>,
    #[serde(default)]
    pub preferences: Vec<UserPreferenceEmbedding>,
}

/// An advertisement together with its service zones
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedAdvertisement {
    #[serde(flatten)]
    pub advertisement: NewAdvertisement,
    #[serde(default)]
    pub zones: Vec<NewGeoZone>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub advertisements: usize,
    pub zones: usize,
    pub preferences: usize,
}

impl SeedCatalog {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    /// Insert everything into `catalog`. Stops at the first invalid record.
    pub fn load_into(self, catalog: &MemoryCatalog) -> Result<SeedSummary> {
        let mut summary = SeedSummary::default();

        for (position, seed) in self.advertisements.into_iter().enumerate() {
            let id: AdId = catalog
                .create_advertisement(seed.advertisement)
                .map_err(|e| seed_error("advertisement", position, e))?;
            summary.advertisements += 1;

            for zone in seed.zones {
                catalog
                    .add_zone(id, zone)
                    .map_err(|e| seed_error("zone of advertisement", position, e))?;
                summary.zones += 1;
            }
        }

        for (position, preference) in self.preferences.into_iter().enumerate() {
            catalog
                .put_preference(preference)
                .map_err(|e| seed_error("preference", position, e))?;
            summary.preferences += 1;
        }

        info!(
            ads = summary.advertisements,
            zones = summary.zones,
            preferences = summary.preferences,
            "seed catalog loaded"
        );
        Ok(summary)
    }
}

fn seed_error(what: &str, position: usize, error: Error) -> Error {
    match error {
        Error::InvalidDimension { .. }
        | Error::InvalidInput(_)
        | Error::InvalidCoordinates { .. } => {
            Error::InvalidInput(format!("seed {} #{}: {}", what, position, error))
        }
        other => other,
    }
}
