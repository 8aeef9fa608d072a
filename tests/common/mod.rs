//! Streams shared by the integration tests.
#![allow(dead_code)]

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use stagevisor::{StreamError, StreamWrite};

/// Writer whose bytes stay observable after a stage consumed it.
#[derive(Clone, Default)]
pub struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().clone()
    }
}

#[async_trait]
impl StreamWrite for SharedSink {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StreamError> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }
}

/// Records every write and fails the `fail_on`-th one (1-based).
pub struct Flaky {
    pub writes: Arc<Mutex<Vec<Vec<u8>>>>,
    pub fail_on: usize,
}

impl Flaky {
    pub fn new(fail_on: usize) -> (Self, Arc<Mutex<Vec<Vec<u8>>>>) {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let flaky = Self {
            writes: Arc::clone(&writes),
            fail_on,
        };
        (flaky, writes)
    }
}

#[async_trait]
impl StreamWrite for Flaky {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StreamError> {
        let mut writes = self.writes.lock();
        writes.push(buf.to_vec());
        if writes.len() == self.fail_on {
            return Err(io::Error::other("disk gone").into());
        }
        Ok(buf.len())
    }
}

/// Deterministic non-repeating-looking payload.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
