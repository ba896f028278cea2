pub mod catalog;
pub mod persistence;
pub mod pool;
pub mod pooled;
pub mod seed;
pub mod spatial;

pub use catalog::{CatalogConfig, MemoryCatalog};
pub use persistence::{CatalogSnapshot, SnapshotFile};
pub use pool::{Pool, PoolConfig, PoolStatus, PooledSession};
pub use pooled::{CatalogSession, PooledStore};
pub use seed::{SeedAdvertisement, SeedCatalog, SeedSummary};
pub use spatial::GeoGrid;
