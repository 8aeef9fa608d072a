//! Event records.
//!
//! Kernel transitions (`Component*`, `StopRequested`, `StoppedBeforeStart`),
//! stage closes (`StreamClosed`) and subscriber trouble (`Subscriber*`) share
//! one [`Event`] shape; which optional fields are filled depends on the
//! [`EventKind`].
//!
//! Every event draws a process-wide `seq` at construction, so listeners that
//! merge several receivers can restore publish order.
//!
//! ```rust
//! use stagevisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::StreamClosed)
//!     .with_component("uploader")
//!     .with_bytes(4096);
//!
//! assert_eq!(ev.kind, EventKind::StreamClosed);
//! assert_eq!(ev.component.as_deref(), Some("uploader"));
//! assert_eq!(ev.bytes, Some(4096));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// `init` finished for the component and its subtree.
    ComponentInit,
    /// `started` fired; the body is about to run.
    ComponentStarted,
    /// First stop request for the component.
    StopRequested,
    /// Stopped while never started; teardown ran inline.
    StoppedBeforeStart,
    /// `stop_done` fired.
    ComponentStopped,
    /// `done` fired. `reason` holds the aggregated error, if any.
    ComponentDone,
    /// A lifecycle body returned an error. `reason` holds it.
    ComponentFailed,
    /// A lifecycle body panicked. `reason` holds the panic message.
    ComponentPanicked,

    /// A stage owned by a component closed: `component` names it, `bytes`
    /// counts what it moved and `reason` carries a close error.
    StreamClosed,

    /// A subscriber queue rejected an event (`reason`: `full` or `closed`).
    SubscriberOverflow,
    /// A subscriber panicked inside `on_event`.
    SubscriberPanicked,
}

/// One published event.
#[derive(Clone, Debug)]
pub struct Event {
    /// Process-wide publish order.
    pub seq: u64,
    pub at: SystemTime,
    pub kind: EventKind,
    /// Component, stage or subscriber name.
    pub component: Option<Arc<str>>,
    pub reason: Option<Arc<str>>,
    pub bytes: Option<u64>,
}

impl Event {
    /// Stamps a fresh event of `kind`.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            component: None,
            reason: None,
            bytes: None,
        }
    }

    #[inline]
    pub fn with_component(mut self, name: impl Into<Arc<str>>) -> Self {
        self.component = Some(name.into());
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = Some(bytes);
        self
    }

    /// Report for an event `subscriber` could not queue.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_component(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Report for a panic inside `subscriber`.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_component(subscriber)
            .with_reason(info)
    }

    /// Returns `true` for subscriber overflow events.
    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::ComponentInit);
        let b = Event::new(EventKind::ComponentDone);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn overflow_helper_sets_fields() {
        let ev = Event::subscriber_overflow("audit", "full");
        assert!(ev.is_subscriber_overflow());
        assert_eq!(ev.component.as_deref(), Some("audit"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber=audit reason=full"));
    }
}
