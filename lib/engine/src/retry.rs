//! Caller-side retry with exponential backoff and jitter
use geoauction_core::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Randomize each delay by up to ±30%
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(200),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A single attempt
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "backoff multiplier must be at least 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(Error::InvalidConfig(
                "max backoff is shorter than initial backoff".to_string(),
            ));
        }
        Ok(())
    }
}

/// Run `f` until it succeeds, fails with a non-transient error, or the retries
/// run out. The last error is returned unchanged.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut backoff = config.initial_backoff;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                attempt += 1;
                let delay = calculate_backoff(backoff, config.jitter);
                warn!(
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;

                backoff = Duration::from_secs_f64(
                    (backoff.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_backoff.as_secs_f64()),
                );
            }
            Err(e) => return Err(e),
        }
    }
}

fn calculate_backoff(base: Duration, jitter: bool) -> Duration {
    if jitter {
        let factor = 1.0 + rand::rng().random_range(-0.3..0.3);
        base.mul_f64(factor)
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quick(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            jitter: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let calls = counter.clone();

        let result = with_retry(&quick(3), move || {
            let count = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(Error::Unavailable("connection refused".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_and_surfaces_the_transient_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let calls = counter.clone();

        let result: Result<()> = with_retry(&quick(2), move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::PoolExhausted { waited: Duration::from_millis(5) }) }
        })
        .await;

        assert!(matches!(result, Err(Error::PoolExhausted { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_errors_are_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let calls = counter.clone();

        let result: Result<()> = with_retry(&quick(5), move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::InvalidInput("bad latitude".into())) }
        })
        .await;

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_validate() {
        assert!(RetryConfig::default().validate().is_ok());
        let shrinking = RetryConfig { backoff_multiplier: 0.5, ..Default::default() };
        assert!(shrinking.validate().is_err());
    }

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_millis(100);
        for _ in 0..100 {
            let delay = calculate_backoff(base, true);
            assert!(delay >= Duration::from_millis(69) && delay <= Duration::from_millis(131));
        }
    }
}
