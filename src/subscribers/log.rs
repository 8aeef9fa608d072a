//! Bridge from the event bus to `tracing`.
//!
//! Failures, panics and overflow go out at `warn`, everything else at `debug`,
//! so a `RUST_LOG=stagevisor=debug` filter shows the whole tree lifecycle.
//!
//! With the `fmt` subscriber:
//! ```text
//! DEBUG stagevisor: started component="uploader"
//! WARN  stagevisor: failed component="uploader" reason="connection reset"
//! DEBUG stagevisor: done component="uploader"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Logs every event it receives.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let component = e.component.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::ComponentInit => tracing::debug!(component, "init"),
            EventKind::ComponentStarted => tracing::debug!(component, "started"),
            EventKind::StopRequested => tracing::debug!(component, "stop-requested"),
            EventKind::StoppedBeforeStart => tracing::debug!(component, "stopped-before-start"),
            EventKind::ComponentStopped => tracing::debug!(component, "stopped"),
            EventKind::ComponentDone => tracing::debug!(component, reason, "done"),
            EventKind::ComponentFailed => tracing::warn!(component, reason, "failed"),
            EventKind::ComponentPanicked => tracing::warn!(component, reason, "panicked"),
            EventKind::StreamClosed => {
                tracing::debug!(component, bytes = e.bytes.unwrap_or(0), reason, "stream-closed")
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(subscriber = component, reason, "subscriber-overflow")
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(subscriber = component, reason, "subscriber-panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
