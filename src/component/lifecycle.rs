//! # Lifecycle abstraction.
//!
//! Domain types implement [`Lifecycle`] by holding a [`Component`] and
//! overriding the bodies they care about. The common handle type is
//! [`ComponentRef`], an `Arc<dyn Lifecycle>` the kernel can share across tasks.
//!
//! The kernel ([`Runner`](super::Runner)) supplies everything else: state
//! signals, child walking, cancellation, error aggregation and panic recovery.

use std::sync::Arc;

use async_trait::async_trait;

use super::state::Component;
use crate::error::BoxError;

/// Shared handle to a lifecycle participant.
pub type ComponentRef = Arc<dyn Lifecycle>;

/// # Overridable lifecycle bodies.
///
/// All bodies run inside the component's `tracing` span; panics are caught by
/// the kernel and recorded as errors.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use stagevisor::{BoxError, Component, Lifecycle};
///
/// struct Ticker {
///     base: Component,
/// }
///
/// #[async_trait]
/// impl Lifecycle for Ticker {
///     fn component(&self) -> &Component { &self.base }
///
///     async fn on_start(&self) -> Result<(), BoxError> {
///         // run until a stop is requested
///         self.base.stopping().wait().await;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Lifecycle: Send + Sync + 'static {
    /// Returns the embedded kernel state.
    fn component(&self) -> &Component;

    /// Prepares the component; children registered here are initialized right after.
    async fn on_init(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Component behavior. Returning ends the component (internal completion).
    ///
    /// Long-running bodies should finish once [`Component::stopping`] fires or
    /// the component token is cancelled.
    async fn on_start(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Teardown. Runs exactly once, after the children were stopped.
    async fn on_stop(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Called on the parent when a child reached `done`.
    ///
    /// The default only logs; override it to cascade a stop on failures.
    fn on_child_done(&self, child: &ComponentRef) {
        let c = child.component();
        match c.err() {
            Some(err) => tracing::debug!(child = c.name(), error = %err, "child done with errors"),
            None => tracing::trace!(child = c.name(), "child done"),
        }
    }
}
