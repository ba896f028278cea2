use clap::Parser;
use geoauction_api::{ApiState, RestApi};
use geoauction_core::HashingEmbedder;
use geoauction_engine::{AuctionEngine, EngineConfig, MissingEmbeddingPolicy, RetryConfig};
use geoauction_storage::{
    CatalogConfig, MemoryCatalog, PoolConfig, PooledStore, SeedCatalog, SnapshotFile,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Geo-targeted ad auction server
#[derive(Parser, Debug)]
#[command(name = "geoauction")]
#[command(about = "Resolves geo-targeted ad auctions over HTTP", long_about = None)]
struct Args {
    /// HTTP API port
    #[arg(long, env = "GEOAUCTION_HTTP_PORT", default_value_t = 8080)]
    http_port: u16,

    /// JSON catalog loaded at startup when no snapshot exists
    #[arg(long, env = "GEOAUCTION_CATALOG")]
    catalog: Option<PathBuf>,

    /// Binary snapshot restored at startup and written at shutdown
    #[arg(long, env = "GEOAUCTION_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    #[arg(long, env = "GEOAUCTION_EMBEDDING_DIM", default_value_t = 384)]
    embedding_dim: usize,

    /// Candidates kept after similarity ranking
    #[arg(long, env = "GEOAUCTION_TOP_K", default_value_t = 10)]
    top_k: usize,

    /// What to do when a requester has no preference embedding (no-winner | neutral)
    #[arg(long, env = "GEOAUCTION_MISSING_EMBEDDING", default_value_t = MissingEmbeddingPolicy::NoWinner)]
    missing_embedding: MissingEmbeddingPolicy,

    /// Exclude ads outside their start/end window
    #[arg(long, env = "GEOAUCTION_ENFORCE_ACTIVE_WINDOW")]
    enforce_active_window: bool,

    /// Derive query embeddings from request keywords when present
    #[arg(long, env = "GEOAUCTION_KEYWORD_EMBEDDINGS")]
    keyword_embeddings: bool,

    #[arg(long, env = "GEOAUCTION_POOL_MAX", default_value_t = 50)]
    pool_max: usize,

    #[arg(long, env = "GEOAUCTION_POOL_MIN", default_value_t = 10)]
    pool_min: usize,

    #[arg(long, env = "GEOAUCTION_POOL_ACQUIRE_TIMEOUT_MS", default_value_t = 250)]
    pool_acquire_timeout_ms: u64,

    /// Default auction deadline; `x-request-timeout-ms` overrides it per request
    #[arg(long, env = "GEOAUCTION_REQUEST_TIMEOUT_MS", default_value_t = 1000)]
    request_timeout_ms: u64,

    /// Retries after a transient storage failure
    #[arg(long, env = "GEOAUCTION_RETRY_ATTEMPTS", default_value_t = 2)]
    retry_attempts: u32,

    #[arg(long, env = "GEOAUCTION_GRID_CELL_DEGREES", default_value_t = 1.0)]
    grid_cell_degrees: f64,

    /// Candidate sets up to this size are ranked by exact scan
    #[arg(long, env = "GEOAUCTION_EXACT_SCAN_THRESHOLD", default_value_t = 2048)]
    exact_scan_threshold: usize,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, env = "GEOAUCTION_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn catalog_config(&self) -> CatalogConfig {
        CatalogConfig {
            embedding_dim: self.embedding_dim,
            grid_cell_degrees: self.grid_cell_degrees,
            exact_scan_threshold: self.exact_scan_threshold,
            ..Default::default()
        }
    }

    fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_size: self.pool_max,
            min_size: self.pool_min,
            acquire_timeout: Duration::from_millis(self.pool_acquire_timeout_ms),
        }
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            embedding_dim: self.embedding_dim,
            top_k: self.top_k,
            missing_embedding: self.missing_embedding,
            enforce_active_window: self.enforce_active_window,
        }
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry_attempts,
            ..Default::default()
        }
    }
}

fn load_catalog(args: &Args) -> anyhow::Result<MemoryCatalog> {
    if let Some(path) = &args.snapshot {
        if let Some(snapshot) = SnapshotFile::new(path).load()? {
            info!(
                path = %path.display(),
                created_at = %snapshot.created_at,
                "restoring catalog snapshot"
            );
            return Ok(MemoryCatalog::from_snapshot(args.catalog_config(), snapshot)?);
        }
    }

    let catalog = MemoryCatalog::new(args.catalog_config())?;
    if let Some(path) = &args.catalog {
        let summary = SeedCatalog::from_path(path)?.load_into(&catalog)?;
        info!(
            path = %path.display(),
            advertisements = summary.advertisements,
            zones = summary.zones,
            preferences = summary.preferences,
            "seed catalog loaded"
        );
    }
    Ok(catalog)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting geoauction v{}", env!("CARGO_PKG_VERSION"));

    let catalog = Arc::new(load_catalog(&args)?);
    info!(
        advertisements = catalog.ad_count(),
        zones = catalog.zone_count(),
        preferences = catalog.preference_count(),
        "catalog ready"
    );

    let store = Arc::new(PooledStore::new(catalog.clone(), args.pool_config())?);
    let mut engine = AuctionEngine::new(store, args.engine_config())?;
    if args.keyword_embeddings {
        engine = engine.with_embedder(Arc::new(HashingEmbedder::new(args.embedding_dim)?))?;
    }

    let retry = args.retry_config();
    retry.validate()?;
    let state = Arc::new(ApiState::new(
        engine,
        retry,
        Duration::from_millis(args.request_timeout_ms),
    ));

    let http_port = args.http_port;
    let http_handle = std::thread::spawn(move || {
        let sys = actix_web::rt::System::new();
        sys.block_on(async {
            if let Err(e) = RestApi::start(state, http_port).await {
                tracing::error!(error = %e, "HTTP server error");
            }
        })
    });

    info!("HTTP API: http://localhost:{}/ads_auction", http_port);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = tokio::task::spawn_blocking(move || {
            http_handle.join().ok();
        }) => {
            info!("HTTP server stopped");
        }
    }

    if let Some(path) = &args.snapshot {
        match SnapshotFile::new(path).save(&catalog.snapshot()) {
            Ok(()) => info!(path = %path.display(), "catalog snapshot written"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write snapshot"),
        }
    }

    info!("Shutting down...");
    Ok(())
}
