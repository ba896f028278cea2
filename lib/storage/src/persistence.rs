use atomicwrites::{AtomicFile, OverwriteBehavior};
use chrono::{DateTime, Utc};
use geoauction_core::{AdGeoZone, Advertisement, Error, Result, UserPreferenceEmbedding};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Full catalog contents, including id counters so ids are never reused after a restore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub embedding_dim: usize,
    pub advertisements: Vec<Advertisement>,
    pub zones: Vec<AdGeoZone>,
    pub preferences: Vec<UserPreferenceEmbedding>,
    pub next_ad_id: u64,
    pub next_zone_id: u64,
    pub created_at: DateTime<Utc>,
}

/// Binary snapshot file, replaced atomically on every save
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, snapshot: &CatalogSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let data = bincode::serialize(snapshot)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        AtomicFile::new(&self.path, OverwriteBehavior::AllowOverwrite)
            .write(|f| f.write_all(&data))
            .map_err(|e| Error::Persistence(format!("{}: {}", self.path.display(), e)))?;

        info!(
            path = %self.path.display(),
            ads = snapshot.advertisements.len(),
            bytes = data.len(),
            "snapshot saved"
        );
        Ok(())
    }

    /// `Ok(None)` when no snapshot has been written yet
    pub fn load(&self) -> Result<Option<CatalogSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let data = std::fs::read(&self.path)?;
        let snapshot: CatalogSnapshot = bincode::deserialize(&data)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Some(snapshot))
    }
}
