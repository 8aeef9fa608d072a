//! # Subscriber trait.
//!
//! A [`Subscribe`] implementation receives the events published on a
//! component tree's [`Bus`](crate::Bus) once a [`SubscriberSet`](super::SubscriberSet)
//! forwards them. Each subscriber owns a bounded queue and a worker task, so a
//! slow or panicking subscriber only ever loses its own events.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use stagevisor::{Event, EventKind, Subscribe};
//!
//! /// Sums the bytes of every closed stage.
//! #[derive(Default)]
//! struct Throughput {
//!     bytes: std::sync::atomic::AtomicU64,
//! }
//!
//! #[async_trait]
//! impl Subscribe for Throughput {
//!     async fn on_event(&self, ev: &Event) {
//!         let n = ev.bytes.unwrap_or(0);
//!         self.bytes.fetch_add(n, std::sync::atomic::Ordering::Relaxed);
//!     }
//!
//!     fn accepts(&self, kind: EventKind) -> bool {
//!         kind == EventKind::StreamClosed
//!     }
//!
//!     fn name(&self) -> &'static str { "throughput" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

/// Consumer of lifecycle and stream events.
///
/// Handlers run on a dedicated worker, never on the publishing task; keep
/// them non-blocking and handle failures internally.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Filters events before they are queued. Default: everything.
    fn accepts(&self, _kind: EventKind) -> bool {
        true
    }

    /// Name reported in overflow and panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue capacity for this subscriber (at least 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
