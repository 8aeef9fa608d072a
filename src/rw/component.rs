//! Lifecycle wrapper around a `Starter` stage.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::stage::{Role, Stage};
use crate::component::{Component, Lifecycle};
use crate::error::{BoxError, StreamError};
use crate::events::{Event, EventKind};

/// Attribute holding the bytes the stage read.
pub const BYTES_READ: &str = "bytes_read";
/// Attribute holding the bytes the stage wrote.
pub const BYTES_WRITTEN: &str = "bytes_written";
/// Attribute holding the final hash (lowercase hex), when hashing is enabled.
pub const HASH: &str = "hash";

/// Component that runs a `Starter` stage as its body.
///
/// `on_init` initializes the stage, `on_start` copies until the stream ends and
/// publishes [`BYTES_READ`], [`BYTES_WRITTEN`] and [`HASH`] as attributes,
/// `on_stop` interrupts the copy and makes sure the stage is closed.
pub struct StageComponent {
    base: Component,
    stage: Mutex<Stage>,
    stop: CancellationToken,
}

impl StageComponent {
    /// Wraps `stage` in a fresh component named `name`.
    pub fn new(name: impl Into<String>, stage: Stage) -> Result<Self, StreamError> {
        Self::with_component(Component::new(name), stage)
    }

    /// Wraps `stage` in a prepared component (e.g. one carrying a bus).
    pub fn with_component(base: Component, mut stage: Stage) -> Result<Self, StreamError> {
        if stage.role() != Role::Starter {
            return Err(StreamError::Role {
                op: "stage component",
                role: stage.role(),
            });
        }
        let stop = CancellationToken::new();
        stage.enable_stop_check(stop.clone());
        Ok(Self {
            base,
            stage: Mutex::new(stage),
            stop,
        })
    }
}

fn is_stopped(err: &StreamError) -> bool {
    match err {
        StreamError::Stopped => true,
        StreamError::Joined(all) => all.iter().any(is_stopped),
        _ => false,
    }
}

#[async_trait]
impl Lifecycle for StageComponent {
    fn component(&self) -> &Component {
        &self.base
    }

    async fn on_init(&self) -> Result<(), BoxError> {
        self.stage.lock().await.init()?;
        Ok(())
    }

    async fn on_start(&self) -> Result<(), BoxError> {
        let mut stage = self.stage.lock().await;
        if stage.is_closed() && self.stop.is_cancelled() {
            // on_stop got the stage first
            return Ok(());
        }
        let res = stage.run().await;

        let attrs = self.base.attrs();
        attrs.store(BYTES_READ, stage.bytes_read());
        attrs.store(BYTES_WRITTEN, stage.bytes_written());
        if let Some(hash) = stage.hash_hex() {
            attrs.store(HASH, hash);
        }
        let mut ev = Event::new(EventKind::StreamClosed).with_bytes(stage.bytes_read());
        if let Err(e) = &res {
            ev = ev.with_reason(e.to_string());
        }
        self.base.emit(ev);
        drop(stage);

        match res {
            Ok(n) => {
                tracing::debug!(bytes = n, "stage drained");
                Ok(())
            }
            Err(e) if self.stop.is_cancelled() && is_stopped(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn on_stop(&self) -> Result<(), BoxError> {
        self.stop.cancel();
        let mut stage = self.stage.lock().await;
        if !stage.is_closed() {
            stage.close().await?;
        }
        Ok(())
    }
}
