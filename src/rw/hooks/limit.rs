//! Token-bucket rate limiting.
//!
//! The bucket refills at `bytes_per_sec` up to `burst`. A request for `n`
//! bytes reserves them immediately (the bucket may go negative) and sleeps
//! for as long as the deficit takes to refill, so concurrent callers queue up
//! fairly behind each other.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::error::StreamError;
use crate::rw::hook::{Hook, IoEvent};

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Byte-rate limiter.
///
/// # Example
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use stagevisor::RateLimiter;
///
/// let limiter = RateLimiter::new(1024 * 1024, 64 * 1024);
/// limiter.acquire(4096).await.unwrap();
/// # }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    max_wait: Option<Duration>,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Creates a full bucket. `bytes_per_sec = 0` disables limiting;
    /// `burst = 0` means one second worth of bytes.
    pub fn new(bytes_per_sec: u64, burst: u64) -> Self {
        let rate = bytes_per_sec as f64;
        let burst = if burst == 0 { rate } else { burst as f64 };
        Self {
            rate,
            burst,
            max_wait: None,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }

    /// Fails requests that would wait longer than `max_wait`.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Builds a limiter from its config.
    pub fn from_config(cfg: &RateLimitConfig) -> Self {
        let limiter = Self::new(cfg.bytes_per_sec, cfg.burst);
        if cfg.max_wait.is_zero() {
            limiter
        } else {
            limiter.with_max_wait(cfg.max_wait)
        }
    }

    /// Returns `true` when the limiter admits everything immediately.
    pub fn is_unlimited(&self) -> bool {
        self.rate <= 0.0
    }

    /// Reserves `n` bytes and returns how long the caller must wait for them.
    ///
    /// Nothing is reserved when the wait would exceed the configured maximum.
    pub fn reserve(&self, n: usize) -> Result<Duration, StreamError> {
        if self.is_unlimited() || n == 0 {
            return Ok(Duration::ZERO);
        }
        let mut b = self.bucket.lock();
        let now = Instant::now();
        let refill = now.saturating_duration_since(b.last).as_secs_f64() * self.rate;
        b.tokens = (b.tokens + refill).min(self.burst);
        b.last = now;

        let deficit = n as f64 - b.tokens;
        let wait = if deficit > 0.0 {
            Duration::from_secs_f64(deficit / self.rate)
        } else {
            Duration::ZERO
        };
        if let Some(max) = self.max_wait {
            if wait > max {
                return Err(StreamError::RateLimitTimeout { waited: max });
            }
        }
        b.tokens -= n as f64;
        Ok(wait)
    }

    /// Waits until `n` bytes are admitted.
    pub async fn acquire(&self, n: usize) -> Result<(), StreamError> {
        let wait = self.reserve(n)?;
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }
}

/// Hook that blocks the caller until the limiter admits the transferred bytes.
#[derive(Debug, Clone)]
pub struct RateLimitHook {
    limiter: Arc<RateLimiter>,
}

impl RateLimitHook {
    /// Limits through `limiter`; one limiter may be shared by several stages.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl Hook for RateLimitHook {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn on_io(&self, ev: &IoEvent<'_>) -> Result<(), StreamError> {
        self.limiter.acquire(ev.n).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn waits_for_the_deficit() {
        let limiter = RateLimiter::new(100, 100);
        let t0 = Instant::now();
        limiter.acquire(100).await.unwrap();
        assert_eq!(t0.elapsed(), Duration::ZERO);

        limiter.acquire(50).await.unwrap();
        assert!(t0.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_wait_fails_without_reserving() {
        let limiter = RateLimiter::new(10, 10).with_max_wait(Duration::from_secs(1));
        limiter.acquire(10).await.unwrap();

        let err = limiter.acquire(100).await.unwrap_err();
        assert!(matches!(err, StreamError::RateLimitTimeout { .. }));
        assert_eq!(limiter.reserve(5).unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn zero_rate_is_unlimited() {
        let limiter = RateLimiter::new(0, 0);
        assert!(limiter.is_unlimited());
        assert_eq!(limiter.reserve(1 << 30).unwrap(), Duration::ZERO);
    }
}
