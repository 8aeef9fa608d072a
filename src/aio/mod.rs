//! Async read-ahead / write-behind primitive.
//!
//! [`AsyncReader`] and [`AsyncWriter`] turn any [`StreamRead`](crate::rw::StreamRead)
//! or [`StreamWrite`](crate::rw::StreamWrite) into one backed by a background
//! pump and a bounded queue of pooled buffers. The first pump error is sticky:
//! later operations return it instead of touching the inner stream again.
//!
//! Stages build their queued mode from these two types.

mod reader;
mod sticky;
mod writer;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use reader::AsyncReader;
pub use sticky::StickyError;
pub use writer::AsyncWriter;

/// Sizing of the background queue.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use stagevisor::AsyncConfig;
///
/// let cfg = AsyncConfig { queue_depth: 8, ..AsyncConfig::default() };
/// assert_eq!(cfg.buf_size, 32 * 1024);
/// assert!(cfg.has_deadline());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncConfig {
    /// Size of each pooled buffer.
    pub buf_size: usize,
    /// Buffers the queue holds before the producer waits.
    pub queue_depth: usize,
    /// Writers only: force-flush a partial buffer idle this long (0 = never).
    #[serde(with = "crate::config::duration_ms")]
    pub deadline: Duration,
}

impl AsyncConfig {
    /// Returns `true` if the writer deadline flush is enabled.
    pub fn has_deadline(&self) -> bool {
        !self.deadline.is_zero()
    }
}

impl Default for AsyncConfig {
    /// - `buf_size = 32 KiB`
    /// - `queue_depth = 4`
    /// - `deadline = 1s`
    fn default() -> Self {
        Self {
            buf_size: 32 * 1024,
            queue_depth: 4,
            deadline: Duration::from_secs(1),
        }
    }
}
