use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::error::StreamError;
use crate::rw::hook::{Hook, IoEvent};

/// Counts bytes and calls.
#[derive(Debug, Default)]
pub struct CountHook {
    bytes: AtomicU64,
    calls: AtomicU64,
}

impl CountHook {
    /// Creates a zeroed counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes seen so far.
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Underlying I/O calls seen so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Hook for CountHook {
    fn name(&self) -> &'static str {
        "count"
    }

    async fn on_io(&self, ev: &IoEvent<'_>) -> Result<(), StreamError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(ev.n as u64, Ordering::Relaxed);
        Ok(())
    }
}
