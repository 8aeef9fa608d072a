use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::StreamError;
use crate::rw::hook::{Direction, Hook, IoEvent};

#[derive(Debug)]
struct Window {
    start: Instant,
    bytes: u64,
}

/// Logs throughput once per `interval` and keeps the last measured rate.
#[derive(Debug)]
pub struct SpeedHook {
    stage: String,
    interval: Duration,
    window: Mutex<Window>,
    last_rate: AtomicU64,
}

impl SpeedHook {
    /// Measures over windows of `interval` for the stage named `stage`.
    pub fn new(stage: impl Into<String>, interval: Duration) -> Self {
        Self {
            stage: stage.into(),
            interval: interval.max(Duration::from_millis(1)),
            window: Mutex::new(Window {
                start: Instant::now(),
                bytes: 0,
            }),
            last_rate: AtomicU64::new(0),
        }
    }

    /// Bytes per second measured over the last completed window.
    pub fn bytes_per_sec(&self) -> u64 {
        self.last_rate.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Hook for SpeedHook {
    fn name(&self) -> &'static str {
        "speed"
    }

    async fn on_io(&self, ev: &IoEvent<'_>) -> Result<(), StreamError> {
        let mut w = self.window.lock();
        w.bytes += ev.n as u64;
        let elapsed = w.start.elapsed();
        if elapsed < self.interval {
            return Ok(());
        }

        let rate = (w.bytes as f64 / elapsed.as_secs_f64()) as u64;
        self.last_rate.store(rate, Ordering::Relaxed);
        let direction = match ev.direction {
            Direction::Read => "read",
            Direction::Write => "write",
        };
        tracing::info!(stage = %self.stage, direction, bytes_per_sec = rate, "throughput");
        w.start = Instant::now();
        w.bytes = 0;
        Ok(())
    }
}
