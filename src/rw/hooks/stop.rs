use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;
use crate::rw::hook::{Hook, IoEvent};

/// Fails every I/O call with [`StreamError::Stopped`] once `token` is cancelled.
#[derive(Debug, Clone)]
pub struct StopHook {
    token: CancellationToken,
}

impl StopHook {
    /// Watches `token`.
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl Hook for StopHook {
    fn name(&self) -> &'static str {
        "stop"
    }

    async fn on_io(&self, _ev: &IoEvent<'_>) -> Result<(), StreamError> {
        if self.token.is_cancelled() {
            return Err(StreamError::Stopped);
        }
        Ok(())
    }
}
