//! # Event bus.
//!
//! [`Bus`] wraps a [`tokio::sync::broadcast`] channel. Components inherit the
//! root's bus at init and publish lifecycle and stream events on it; a
//! [`SubscriberSet`] consumes them through [`Bus::forward`].
//!
//! ```text
//!   Component A ──┐
//!   Component B ──┼──► Bus (ring of `capacity` events) ──► forward(until) ──► SubscriberSet
//!   StageComponent┘                                  └──► subscribe() receivers
//! ```
//!
//! `publish` never blocks and never fails: without receivers the event is
//! dropped, and receivers that fall more than `capacity` events behind skip
//! the oldest ones (`RecvError::Lagged`).

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::event::Event;
use crate::subscribers::SubscriberSet;

/// Broadcast channel for runtime events. Clones share the channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus holding up to `capacity` undelivered events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes `ev` to every current receiver.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// New receiver observing events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Spawns a listener feeding every event into `set`.
    ///
    /// The listener stops once `until` is cancelled, after handing over the
    /// events already queued for it. Passing the root component's token ties
    /// it to the tree: the token is cancelled right after the root's `done`.
    pub fn forward(&self, set: Arc<SubscriberSet>, until: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                let res = tokio::select! {
                    biased;
                    res = rx.recv() => res,
                    _ = until.cancelled() => break,
                };
                match res {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "event listener lagged");
                    }
                    Err(RecvError::Closed) => return,
                }
            }
            loop {
                match rx.try_recv() {
                    Ok(ev) => set.emit(&ev),
                    Err(TryRecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "event listener lagged");
                    }
                    Err(_) => return,
                }
            }
        })
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::subscribers::Subscribe;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Kinds(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Kinds {
        async fn on_event(&self, event: &Event) {
            self.0.lock().push(event.kind);
        }
    }

    #[tokio::test]
    async fn forward_drains_pending_events_after_cancel() {
        let bus = Bus::new(8);
        let kinds = Arc::new(Kinds::default());
        let set = Arc::new(SubscriberSet::new(vec![kinds.clone()], bus.clone()));
        let until = CancellationToken::new();
        let listener = bus.forward(Arc::clone(&set), until.clone());

        bus.publish(Event::new(EventKind::ComponentStarted));
        bus.publish(Event::new(EventKind::ComponentDone));
        until.cancel();
        listener.await.unwrap();

        let Ok(set) = Arc::try_unwrap(set) else {
            panic!("listener still holds the set");
        };
        set.shutdown().await;
        assert_eq!(
            *kinds.0.lock(),
            vec![EventKind::ComponentStarted, EventKind::ComponentDone]
        );
    }
}
