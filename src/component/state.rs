//! # Component: state owned by every lifecycle participant.
//!
//! A [`Component`] is embedded (by composition) into each domain type that
//! implements [`Lifecycle`](super::Lifecycle). It owns:
//! - the cancellation token (derived from the parent's at init),
//! - four one-shot [`Signal`]s: `started`, `stopping`, `stop_done`, `done`,
//! - the sticky [`ErrorStore`] and the [`Attributes`] map,
//! - the ordered, name-unique list of children and a weak link to the parent,
//! - the `tracing` span and the optional event [`Bus`] inherited at init.
//!
//! The kernel operations themselves live in [`Runner`](super::Runner).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use super::attrs::Attributes;
use super::errors::ErrorStore;
use super::lifecycle::{ComponentRef, Lifecycle};
use super::signal::Signal;
use crate::error::{ComponentError, MultiError};
use crate::events::{Bus, Event, EventKind};

/// Attribute set when a component was stopped before it started.
pub const STOPPED_BEFORE_START: &str = "stopped_before_start";

/// Lifecycle state shared by all components.
pub struct Component {
    name: String,
    token: RwLock<CancellationToken>,
    started: Signal,
    stopping: Signal,
    stop_done: Signal,
    done: Signal,
    inited: AtomicBool,
    parent_notified: AtomicBool,
    errors: ErrorStore,
    attrs: Attributes,
    children: RwLock<Vec<ComponentRef>>,
    parent: OnceLock<Weak<dyn Lifecycle>>,
    span: RwLock<tracing::Span>,
    bus: RwLock<Option<Bus>>,
}

impl Component {
    /// Creates a root-ready component with a fresh cancellation token.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let span = tracing::debug_span!("component", name = %name);
        Self {
            name,
            token: RwLock::new(CancellationToken::new()),
            started: Signal::new(),
            stopping: Signal::new(),
            stop_done: Signal::new(),
            done: Signal::new(),
            inited: AtomicBool::new(false),
            parent_notified: AtomicBool::new(false),
            errors: ErrorStore::default(),
            attrs: Attributes::new(),
            children: RwLock::new(Vec::new()),
            parent: OnceLock::new(),
            span: RwLock::new(span),
            bus: RwLock::new(None),
        }
    }

    /// Attaches an event bus; children inherit it at init unless they have their own.
    pub fn with_bus(self, bus: Bus) -> Self {
        *self.bus.write() = Some(bus);
        self
    }

    /// Component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current cancellation token (a child token of the parent's after init).
    pub fn token(&self) -> CancellationToken {
        self.token.read().clone()
    }

    /// Fires when the component is marked started.
    pub fn started(&self) -> &Signal {
        &self.started
    }

    /// Fires when a stop was requested or the body returned.
    pub fn stopping(&self) -> &Signal {
        &self.stopping
    }

    /// Fires when the stop teardown finished.
    pub fn stop_done(&self) -> &Signal {
        &self.stop_done
    }

    /// Fires once the component is completely finished.
    pub fn done(&self) -> &Signal {
        &self.done
    }

    /// Attribute store.
    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    /// Span the component's bodies run in.
    pub fn span(&self) -> tracing::Span {
        self.span.read().clone()
    }

    /// Event bus, if one was attached or inherited.
    pub fn bus(&self) -> Option<Bus> {
        self.bus.read().clone()
    }

    /// Returns `true` if the component was stopped before it started.
    pub fn stopped_before_start(&self) -> bool {
        self.attrs.load_or(STOPPED_BEFORE_START, false)
    }

    /// Registers a child. Names are unique among siblings.
    ///
    /// Children are initialized by the parent's `init` in registration order and
    /// stopped in reverse order.
    pub fn add_child(&self, child: ComponentRef) -> Result<(), ComponentError> {
        let mut children = self.children.write();
        let name = child.component().name();
        if children.iter().any(|c| c.component().name() == name) {
            return Err(ComponentError::DuplicateChild {
                parent: self.name.clone(),
                child: name.to_string(),
            });
        }
        children.push(child);
        Ok(())
    }

    /// Snapshot of the children in registration order.
    pub fn children(&self) -> Vec<ComponentRef> {
        self.children.read().clone()
    }

    /// Child with the given name.
    pub fn child(&self, name: &str) -> Option<ComponentRef> {
        self.children
            .read()
            .iter()
            .find(|c| c.component().name() == name)
            .cloned()
    }

    /// Parent component, if attached and still alive.
    pub fn parent(&self) -> Option<ComponentRef> {
        self.parent.get().and_then(Weak::upgrade)
    }

    /// Appends an error to the component's own error store.
    pub fn append_error(&self, err: ComponentError) {
        self.errors.append(err);
    }

    /// Errors recorded by this component only.
    pub fn self_err(&self) -> Option<MultiError> {
        self.errors.get()
    }

    /// Errors recorded anywhere below this component.
    pub fn children_err(&self) -> Option<MultiError> {
        let mut all = MultiError::new();
        for child in self.children() {
            if let Some(e) = child.component().err() {
                all.extend(e);
            }
        }
        all.into_option()
    }

    /// Own errors followed by the children's errors.
    pub fn err(&self) -> Option<MultiError> {
        let mut all = self.self_err().unwrap_or_default();
        if let Some(children) = self.children_err() {
            all.extend(children);
        }
        all.into_option()
    }

    /// Waits for every child that was started to reach `done`.
    pub async fn wait_children_done(&self) {
        for child in self.children() {
            let c = child.component();
            if c.started().is_fired() {
                c.done().wait().await;
            }
        }
    }

    pub(crate) fn publish(&self, kind: EventKind, reason: Option<String>) {
        let mut ev = Event::new(kind);
        if let Some(r) = reason {
            ev = ev.with_reason(r);
        }
        self.emit(ev);
    }

    /// Publishes `ev` on the bus, stamped with this component's name.
    pub(crate) fn emit(&self, ev: Event) {
        if let Some(bus) = self.bus.read().as_ref() {
            bus.publish(ev.with_component(self.name.as_str()));
        }
    }

    /// Marks init as done; returns `false` if it already was.
    pub(crate) fn mark_inited(&self) -> bool {
        !self.inited.swap(true, Ordering::SeqCst)
    }

    /// Reverts [`mark_inited`](Self::mark_inited) after a failed init so a retry runs it again.
    pub(crate) fn clear_inited(&self) {
        self.inited.store(false, Ordering::SeqCst);
    }

    /// Marks the parent as notified; returns `false` if it already was.
    pub(crate) fn mark_parent_notified(&self) -> bool {
        !self.parent_notified.swap(true, Ordering::SeqCst)
    }

    /// Links `self` under `parent`: parent pointer (once), child token, span, bus.
    ///
    /// Attaching again to the same parent (an init retry) only refreshes the links.
    pub(crate) fn attach_to(&self, parent: &ComponentRef) -> Result<(), ComponentError> {
        let weak = Arc::downgrade(parent);
        match self.parent.get() {
            Some(current) if Weak::ptr_eq(current, &weak) => {}
            Some(_) => {
                return Err(ComponentError::ParentAlreadySet {
                    component: self.name.clone(),
                });
            }
            None => {
                self.parent
                    .set(weak)
                    .map_err(|_| ComponentError::ParentAlreadySet {
                        component: self.name.clone(),
                    })?;
            }
        }

        let pc = parent.component();
        *self.token.write() = pc.token().child_token();
        let parent_span = pc.span();
        *self.span.write() = tracing::debug_span!(parent: &parent_span, "component", name = %self.name);

        let mut bus = self.bus.write();
        if bus.is_none() {
            *bus = pc.bus();
        }
        Ok(())
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("started", &self.started.is_fired())
            .field("stopping", &self.stopping.is_fired())
            .field("done", &self.done.is_fired())
            .field("children", &self.children.read().len())
            .finish()
    }
}
