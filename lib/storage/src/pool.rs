//! Bounded session pool.
//!
//! Limits how many storage calls run at once. Sessions are created lazily up
//! to `max_size`, with `min_size` created up front, and are recycled on drop.
//! Waiting for a free session is bounded by `acquire_timeout`.

use geoauction_core::{Error, Result};
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, warn};

/// Pool sizing and acquisition timeout
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of sessions
    pub max_size: usize,
    /// Sessions created at construction
    pub min_size: usize,
    /// How long `acquire` waits for a free session
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 50,
            min_size: 10,
            acquire_timeout: Duration::from_millis(250),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::InvalidConfig("pool max size must be positive".to_string()));
        }
        if self.min_size > self.max_size {
            return Err(Error::InvalidConfig(format!(
                "pool min size {} exceeds max size {}",
                self.min_size, self.max_size
            )));
        }
        if self.acquire_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "pool acquire timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Point-in-time pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStatus {
    pub size: usize,
    pub idle: usize,
    pub in_use: usize,
    pub max_size: usize,
}

type Factory<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

pub struct Pool<T> {
    config: PoolConfig,
    semaphore: Semaphore,
    idle: Mutex<Vec<T>>,
    created: AtomicUsize,
    factory: Factory<T>,
}

impl<T: Send> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish()
    }
}

impl<T: Send> Pool<T> {
    pub fn new<F>(config: PoolConfig, factory: F) -> Result<Self>
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        config.validate()?;

        let warm = (0..config.min_size)
            .map(|_| factory())
            .collect::<Result<Vec<_>>>()?;
        debug!(
            min_size = config.min_size,
            max_size = config.max_size,
            "session pool created"
        );

        Ok(Self {
            semaphore: Semaphore::new(config.max_size),
            created: AtomicUsize::new(warm.len()),
            idle: Mutex::new(warm),
            factory: Box::new(factory),
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Wait up to the acquire timeout for a session
    pub async fn acquire(&self) -> Result<PooledSession<'_, T>> {
        let started = Instant::now();
        let permit = match tokio::time::timeout(self.config.acquire_timeout, self.semaphore.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(Error::Unavailable("session pool is closed".to_string())),
            Err(_) => {
                let waited = started.elapsed();
                warn!(waited_ms = waited.as_millis() as u64, "session pool exhausted");
                return Err(Error::PoolExhausted { waited });
            }
        };

        let recycled = self.idle.lock().pop();
        let session = match recycled {
            Some(session) => session,
            None => {
                let session = (self.factory)()?;
                self.created.fetch_add(1, Ordering::Relaxed);
                session
            }
        };

        Ok(PooledSession {
            pool: self,
            session: Some(session),
            _permit: permit,
        })
    }

    /// Refuse new acquisitions; sessions already handed out finish normally
    pub fn close(&self) {
        self.semaphore.close();
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    pub fn status(&self) -> PoolStatus {
        let size = self.created.load(Ordering::Relaxed);
        let idle = self.idle.lock().len();
        PoolStatus {
            size,
            idle,
            in_use: size.saturating_sub(idle),
            max_size: self.config.max_size,
        }
    }
}

/// A session checked out of a [`Pool`], returned to it on drop
pub struct PooledSession<'a, T> {
    pool: &'a Pool<T>,
    session: Option<T>,
    _permit: SemaphorePermit<'a>,
}

impl<T> Deref for PooledSession<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only taken in Drop
        match &self.session {
            Some(session) => session,
            None => unreachable!("pooled session used after release"),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PooledSession<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledSession").field(&self.session).finish()
    }
}

impl<T> Drop for PooledSession<'_, T> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.idle.lock().push(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(max_size: usize, min_size: usize) -> Pool<usize> {
        let counter = AtomicUsize::new(0);
        Pool::new(
            PoolConfig {
                max_size,
                min_size,
                acquire_timeout: Duration::from_millis(50),
            },
            move || Ok(counter.fetch_add(1, Ordering::Relaxed)),
        )
        .unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(PoolConfig::default().validate().is_ok());
        let bad = PoolConfig { min_size: 5, max_size: 2, ..Default::default() };
        assert!(bad.validate().is_err());
        let zero = PoolConfig { max_size: 0, min_size: 0, ..Default::default() };
        assert!(zero.validate().is_err());
    }

    #[tokio::test]
    async fn test_min_sessions_are_warm() {
        let pool = pool(4, 2);
        assert_eq!(
            pool.status(),
            PoolStatus { size: 2, idle: 2, in_use: 0, max_size: 4 }
        );
    }

    #[tokio::test]
    async fn test_sessions_are_recycled() {
        let pool = pool(2, 0);
        let first = *pool.acquire().await.unwrap();
        let second = *pool.acquire().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(pool.status().size, 1);
    }

    #[tokio::test]
    async fn test_exhaustion_times_out() {
        let pool = pool(2, 2);
        let _a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();
        assert_eq!(pool.status().in_use, 2);

        let started = Instant::now();
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, Error::PoolExhausted { .. }));
        assert!(err.is_transient());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_release_unblocks_waiter() {
        let pool = std::sync::Arc::new(pool(1, 1));
        let held = pool.acquire().await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|s| *s) })
        };
        drop(held);
        assert_eq!(waiter.await.unwrap().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let pool = pool(1, 0);
        pool.close();
        assert!(matches!(pool.acquire().await, Err(Error::Unavailable(_))));
    }
}
