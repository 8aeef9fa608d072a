//! # Kernel operations: init, start, stop.
//!
//! [`Runner`] is implemented for [`ComponentRef`] and drives a component tree
//! through its lifecycle, publishing events to the component's bus.
//!
//! ## Flow
//!
//! ```text
//! init():   on_init(self) ──► for child in children: attach + child.init()   (fail fast)
//!
//! start():  spawn watcher (token cancelled ─► stop())
//!           fire started
//!           stopping already fired? ─► skip body
//!           on_start() ─► error/panic recorded
//!           cleanup (every path, in order):
//!             stop flow if nobody requested one (does not wait for done)
//!             wait started children done ─► wait stop_done ─► fire done
//!             ─► cancel token ─► parent.on_child_done()
//!
//! stop():   fire stopping (second call: no-op)
//!           children.rev().stop()   (issued in reverse order, awaited together)
//!           never started? ─► on_stop inline, stop_done, done, cancel, notify parent
//!           otherwise      ─► on_stop, stop_done, cancel, wait done
//! ```
//!
//! ## Rules
//! - Every signal fires **at most once**; `on_stop` runs **exactly once**.
//! - `done` fires only after every started child is `done`.
//! - Panics in `on_init`/`on_start`/`on_stop`/`on_child_done` become
//!   [`ComponentError::Panicked`]; they never unwind into the caller.
//! - The parent is notified once, including for components stopped before start.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::lifecycle::ComponentRef;
use super::state::{Component, STOPPED_BEFORE_START};
use crate::error::{BoxError, ComponentError, MultiError, Phase, panic_message};
use crate::events::EventKind;

/// Kernel operations on a component tree.
#[async_trait]
pub trait Runner {
    /// Initializes self, then every child (registration order). Fails fast.
    ///
    /// A second call is a no-op.
    async fn init(&self) -> Result<(), ComponentError>;

    /// Runs the component until it is done and returns its aggregated errors.
    ///
    /// Meant to run as its own task, see [`Runner::spawn`].
    async fn start(&self) -> Result<(), MultiError>;

    /// Stops children (reverse order) then self, and waits for `done`.
    ///
    /// Concurrent and repeated calls run the teardown once.
    async fn stop(&self);

    /// Spawns [`Runner::start`] on the tokio runtime.
    fn spawn(&self) -> JoinHandle<Result<(), MultiError>>;

    /// `init` followed by `start` on the current task.
    async fn run(&self) -> Result<(), MultiError>;
}

#[async_trait]
impl Runner for ComponentRef {
    async fn init(&self) -> Result<(), ComponentError> {
        let c = self.component();
        if !c.mark_inited() {
            return Ok(());
        }
        if let Err(err) = init_tree(self).await {
            c.clear_inited();
            tracing::debug!(parent: &c.span(), error = %err, "init failed");
            return Err(err);
        }

        tracing::debug!(parent: &c.span(), "initialized");
        c.publish(EventKind::ComponentInit, None);
        Ok(())
    }

    async fn start(&self) -> Result<(), MultiError> {
        let c = self.component();
        spawn_watcher(self.clone());

        c.started().fire();
        c.publish(EventKind::ComponentStarted, None);

        if c.stopping().is_fired() {
            tracing::debug!(parent: &c.span(), "stop already pending, body skipped");
        } else if let Err(failure) = guarded(self.on_start(), c.span()).await {
            record(c, Phase::Start, failure);
        }

        stop_flow(self, false).await;
        c.wait_children_done().await;
        c.stop_done().wait().await;
        mark_done(c);
        c.token().cancel();
        notify_parent(self);

        match c.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn stop(&self) {
        stop_flow(self, true).await;
    }

    fn spawn(&self) -> JoinHandle<Result<(), MultiError>> {
        let node = self.clone();
        tokio::spawn(async move { node.start().await })
    }

    async fn run(&self) -> Result<(), MultiError> {
        if let Err(err) = self.init().await {
            let mut all = MultiError::new();
            all.push(err);
            return Err(all);
        }
        self.start().await
    }
}

impl Component {
    /// Spawns `start` for every child, in registration order.
    pub fn start_children(&self) -> Vec<JoinHandle<Result<(), MultiError>>> {
        self.children().iter().map(Runner::spawn).collect()
    }
}

/// Outcome of a lifecycle body that did not succeed.
enum Failure {
    Error(BoxError),
    Panic(String),
}

impl Failure {
    fn into_error(self, component: &str, phase: Phase) -> ComponentError {
        match self {
            Failure::Panic(message) => ComponentError::Panicked {
                component: component.to_string(),
                phase,
                message,
            },
            Failure::Error(e) => match phase {
                Phase::Init => ComponentError::init(component, e),
                Phase::Start => ComponentError::start(component, e),
                Phase::Stop | Phase::ChildDone => ComponentError::stop(component, e),
            },
        }
    }
}

/// Runs a body inside `span`, converting errors and panics into a [`Failure`].
async fn init_tree(node: &ComponentRef) -> Result<(), ComponentError> {
    let c = node.component();
    guarded(node.on_init(), c.span())
        .await
        .map_err(|f| f.into_error(c.name(), Phase::Init))?;

    for child in c.children() {
        child.component().attach_to(node)?;
        child.init().await?;
    }
    Ok(())
}

async fn guarded<F>(body: F, span: tracing::Span) -> Result<(), Failure>
where
    F: Future<Output = Result<(), BoxError>> + Send,
{
    match AssertUnwindSafe(body.instrument(span)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Failure::Error(e)),
        Err(payload) => Err(Failure::Panic(panic_message(payload.as_ref()))),
    }
}

fn record(c: &Component, phase: Phase, failure: Failure) {
    let err = failure.into_error(c.name(), phase);
    let kind = if err.is_panic() {
        EventKind::ComponentPanicked
    } else {
        EventKind::ComponentFailed
    };
    tracing::warn!(parent: &c.span(), %phase, error = %err, "lifecycle body failed");
    c.publish(kind, Some(err.to_string()));
    c.append_error(err);
}

fn mark_done(c: &Component) {
    if c.done().fire() {
        let reason = c.err().map(|e| e.to_string());
        tracing::debug!(parent: &c.span(), failed = reason.is_some(), "done");
        c.publish(EventKind::ComponentDone, reason);
    }
}

/// Stops the component when its (inherited) token is cancelled; exits on `done`.
fn spawn_watcher(node: ComponentRef) {
    let token = node.component().token();
    let done = node.component().done().clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => node.stop().await,
            _ = done.wait() => {}
        }
    });
}

async fn stop_flow(node: &ComponentRef, wait_done: bool) {
    let c = node.component();
    if !c.stopping().fire() {
        return;
    }
    tracing::debug!(parent: &c.span(), "stopping");
    c.publish(EventKind::StopRequested, None);

    let children = c.children();
    join_all(children.iter().rev().map(|child| child.stop())).await;

    if !c.started().is_fired() {
        c.attrs().store(STOPPED_BEFORE_START, true);
        c.publish(EventKind::StoppedBeforeStart, None);
        teardown(node).await;
        mark_done(c);
        c.token().cancel();
        notify_parent(node);
        return;
    }

    teardown(node).await;
    c.token().cancel();
    if wait_done {
        c.done().wait().await;
    }
}

async fn teardown(node: &ComponentRef) {
    let c = node.component();
    if let Err(failure) = guarded(node.on_stop(), c.span()).await {
        record(c, Phase::Stop, failure);
    }
    if c.stop_done().fire() {
        c.publish(EventKind::ComponentStopped, None);
    }
}

fn notify_parent(node: &ComponentRef) {
    let c = node.component();
    if !c.mark_parent_notified() {
        return;
    }
    let Some(parent) = c.parent() else {
        return;
    };
    let res = std::panic::catch_unwind(AssertUnwindSafe(|| parent.on_child_done(node)));
    if let Err(payload) = res {
        record(
            parent.component(),
            Phase::ChildDone,
            Failure::Panic(panic_message(payload.as_ref())),
        );
    }
}
