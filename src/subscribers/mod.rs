//! Event consumers.
//!
//! ```text
//!   Runner / StageComponent ─► Bus ─► Bus::forward ─► SubscriberSet ─┬─► LogWriter
//!                                                                    └─► your Subscribe impls
//! ```
//!
//! Implement [`Subscribe`] for custom consumers (metrics, progress bars,
//! audit trails). `LogWriter` needs the `logging` feature.

#[cfg(feature = "logging")]
mod log;
mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
