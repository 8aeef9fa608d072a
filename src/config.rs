//! # Stage configuration.
//!
//! [`StageConfig`] describes the optional capabilities of a [`Stage`](crate::Stage)
//! in a serializable form; [`Stage::with_config`](crate::Stage::with_config)
//! applies it through the `enable_*` setters. Numeric sentinels follow one rule:
//! `0` means disabled / unlimited.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use stagevisor::{RateLimitConfig, StageConfig};
//!
//! let cfg: StageConfig = serde_json::from_str(r#"{
//!     "read_buf": 65536,
//!     "hash": "sha256",
//!     "rate_limit": { "bytes_per_sec": 1048576 }
//! }"#).unwrap();
//!
//! assert_eq!(cfg.read_buf, 65536);
//! assert!(cfg.async_read.is_none());
//! assert_eq!(cfg.rate_limit, Some(RateLimitConfig { bytes_per_sec: 1 << 20, ..Default::default() }));
//! assert!(!cfg.has_write_deadline());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aio::AsyncConfig;

/// Optional capabilities of one stage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Synchronous read buffer size (0 = disabled).
    pub read_buf: usize,
    /// Synchronous write buffer size (0 = disabled).
    pub write_buf: usize,
    /// Flush a partially filled synchronous write buffer this long after the
    /// last flush (0 = only when full, on flush and on close).
    #[serde(with = "duration_ms")]
    pub write_deadline: Duration,
    /// Background-queue reading.
    pub async_read: Option<AsyncConfig>,
    /// Background-queue writing.
    pub async_write: Option<AsyncConfig>,
    /// Rolling hash algorithm name.
    pub hash: Option<String>,
    /// Expected digest (hex) checked at end-of-stream; requires `hash`.
    pub checksum: Option<String>,
    /// Token-bucket rate limit.
    pub rate_limit: Option<RateLimitConfig>,
    /// Throughput logging interval.
    #[serde(with = "opt_duration_ms")]
    pub monitor_speed: Option<Duration>,
}

impl StageConfig {
    /// Returns `true` if the synchronous write deadline is enabled.
    pub fn has_write_deadline(&self) -> bool {
        !self.write_deadline.is_zero()
    }
}

/// Token-bucket settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained rate (0 = unlimited).
    pub bytes_per_sec: u64,
    /// Bucket size (0 = one second worth of bytes).
    pub burst: u64,
    /// Longest a single call may wait before failing (0 = unbounded).
    #[serde(with = "duration_ms")]
    pub max_wait: Duration,
}

/// Serializes a [`Duration`] as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Serializes an optional [`Duration`] as integer milliseconds.
pub(crate) mod opt_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_round_trip_as_millis() {
        let cfg = StageConfig {
            write_deadline: Duration::from_millis(250),
            monitor_speed: Some(Duration::from_secs(2)),
            async_write: Some(AsyncConfig::default()),
            ..StageConfig::default()
        };
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["write_deadline"], 250);
        assert_eq!(json["monitor_speed"], 2000);
        assert_eq!(json["async_write"]["deadline"], 1000);

        let back: StageConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: StageConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, StageConfig::default());
        let limit: RateLimitConfig = serde_json::from_str(r#"{"max_wait": 1500}"#).unwrap();
        assert_eq!(limit.max_wait, Duration::from_millis(1500));
    }
}
