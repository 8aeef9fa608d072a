//! # Fan-out of events to subscribers.
//!
//! ```text
//! emit(ev) ─► for each subscriber accepting ev.kind:
//!               try_send ─► [bounded queue] ─► worker ─► on_event(ev)
//!                  │                              └─ panic ─► SubscriberPanicked on the bus
//!                  └─ full / closed ─► SubscriberOverflow on the bus
//! ```
//!
//! `emit` never waits. Each subscriber sees the events it accepts in publish
//! order; a dropped event is lost for that subscriber only.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::panic_message;
use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

struct Lane {
    sub: Arc<dyn Subscribe>,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Set of subscribers fed from one bus.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber. Overflow and panic reports go to `bus`.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut lanes = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());
        for sub in subs {
            let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
            workers.push(tokio::spawn(worker(Arc::clone(&sub), rx, bus.clone())));
            lanes.push(Lane { sub, tx });
        }
        Self {
            lanes,
            workers,
            bus,
        }
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    /// Returns `true` if the set has no subscribers.
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Queues `event` for every subscriber that accepts it.
    pub fn emit(&self, event: &Event) {
        if self.lanes.iter().any(|l| l.sub.accepts(event.kind)) {
            self.emit_arc(Arc::new(event.clone()));
        }
    }

    /// Same as [`emit`](Self::emit) for an already shared event.
    ///
    /// Overflow reports are never reported as overflowing themselves.
    pub fn emit_arc(&self, event: Arc<Event>) {
        for lane in self.lanes.iter().filter(|l| l.sub.accepts(event.kind)) {
            let reason = match lane.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !event.is_subscriber_overflow() {
                self.bus
                    .publish(Event::subscriber_overflow(lane.sub.name(), reason));
            }
        }
    }

    /// Closes every queue and waits for the workers to drain them.
    pub async fn shutdown(self) {
        drop(self.lanes);
        for w in self.workers {
            if let Err(e) = w.await {
                tracing::debug!(error = %e, "subscriber worker ended abnormally");
            }
        }
    }
}

async fn worker(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let handled = std::panic::AssertUnwindSafe(sub.on_event(&ev))
            .catch_unwind()
            .await;
        if let Err(payload) = handled {
            let message = panic_message(payload.as_ref());
            tracing::warn!(subscriber = sub.name(), %message, "subscriber panicked");
            bus.publish(Event::subscriber_panicked(sub.name(), message));
        }
    }
}
