//! Lifecycle kernel.
//!
//! - [`Component`] is the state every participant embeds.
//! - [`Lifecycle`] holds the overridable bodies.
//! - [`Runner`] drives a [`ComponentRef`] tree through init, start and stop.

mod attrs;
mod errors;
mod lifecycle;
mod runner;
mod signal;
mod state;

pub use attrs::Attributes;
pub use errors::ErrorStore;
pub use lifecycle::{ComponentRef, Lifecycle};
pub use runner::Runner;
pub use signal::Signal;
pub use state::{Component, STOPPED_BEFORE_START};
