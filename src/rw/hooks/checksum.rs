use std::sync::Arc;

use async_trait::async_trait;

use super::hash::HashHook;
use crate::error::StreamError;
use crate::rw::hook::{Hook, IoEvent};

/// Compares the rolling hash with an expected digest at end-of-stream.
///
/// A mismatch turns the terminal read into an error that still carries
/// end-of-stream (see [`StreamError::is_eof`]). Writes never see an
/// end-of-stream event; writer stages call [`verify`](Self::verify) on close.
#[derive(Debug)]
pub struct ChecksumHook {
    expected: String,
    hash: Arc<HashHook>,
}

impl ChecksumHook {
    /// Checks `hash` against `expected` (hex, case-insensitive).
    pub fn new(expected: impl Into<String>, hash: Arc<HashHook>) -> Self {
        Self {
            expected: expected.into().to_ascii_lowercase(),
            hash,
        }
    }

    /// Compares the digest accumulated so far with the expected one.
    pub fn verify(&self) -> Result<(), StreamError> {
        let actual = self.hash.hex_digest();
        if actual != self.expected {
            return Err(StreamError::Checksum {
                algorithm: self.hash.algorithm().name().to_string(),
                expected: self.expected.clone(),
                actual,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Hook for ChecksumHook {
    fn name(&self) -> &'static str {
        "checksum"
    }

    async fn on_io(&self, ev: &IoEvent<'_>) -> Result<(), StreamError> {
        if !ev.eof {
            return Ok(());
        }
        self.verify()
    }
}
