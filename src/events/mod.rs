//! Lifecycle and stream events.
//!
//! [`Event`] is a small value record tagged by [`EventKind`]; [`Bus`] moves it
//! from publishers to listeners over a `tokio::sync::broadcast` ring.
//!
//! Publishers: the [`Runner`](crate::Runner) on every kernel transition,
//! [`StageComponent`](crate::StageComponent) when its stage closes, and
//! [`SubscriberSet`](crate::SubscriberSet) workers on overflow or panic.
//! Listeners either call [`Bus::subscribe`] directly or let [`Bus::forward`]
//! feed a subscriber set.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
