use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use stagevisor::{
    BoxError, Bus, Component, ComponentError, ComponentRef, EventKind, Lifecycle, Phase, Runner,
};

#[derive(Clone, Copy)]
enum Body {
    UntilStopped,
    Return,
    Fail,
    Panic,
    AwaitChildren,
}

type Log = Arc<Mutex<Vec<String>>>;

struct Probe {
    base: Component,
    body: Body,
    log: Log,
    stops: AtomicUsize,
    children_done: Mutex<Vec<String>>,
    panic_on_child_done: bool,
}

impl Probe {
    fn new(name: &str, body: Body, log: &Log) -> Arc<Self> {
        Self::with_base(Component::new(name), body, log)
    }

    fn with_base(base: Component, body: Body, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            base,
            body,
            log: Arc::clone(log),
            stops: AtomicUsize::new(0),
            children_done: Mutex::new(Vec::new()),
            panic_on_child_done: false,
        })
    }

    fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Lifecycle for Probe {
    fn component(&self) -> &Component {
        &self.base
    }

    async fn on_start(&self) -> Result<(), BoxError> {
        let handles = self.base.start_children();
        match self.body {
            Body::UntilStopped => {
                self.base.stopping().wait().await;
                Ok(())
            }
            Body::Return => Ok(()),
            Body::Fail => Err("disk full".into()),
            Body::Panic => panic!("body exploded"),
            Body::AwaitChildren => {
                for h in handles {
                    let _ = h.await;
                }
                Ok(())
            }
        }
    }

    async fn on_stop(&self) -> Result<(), BoxError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(format!("stop:{}", self.base.name()));
        Ok(())
    }

    fn on_child_done(&self, child: &ComponentRef) {
        let name = child.component().name().to_string();
        self.log.lock().push(format!("child_done:{name}"));
        self.children_done.lock().push(name);
        if self.panic_on_child_done {
            panic!("callback exploded");
        }
    }
}

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn position(log: &Log, entry: &str) -> usize {
    let entries = log.lock().clone();
    entries
        .iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("{entry} missing from {entries:?}"))
}

#[tokio::test]
async fn stopping_root_before_start_stops_each_child_once() {
    let log = log();
    let root = Probe::new("R", Body::UntilStopped, &log);
    let a = Probe::new("A", Body::UntilStopped, &log);
    let b = Probe::new("B", Body::UntilStopped, &log);
    root.base.add_child(a.clone()).unwrap();
    root.base.add_child(b.clone()).unwrap();

    let node: ComponentRef = root.clone();
    node.init().await.unwrap();
    node.stop().await;

    assert_eq!((a.stops(), b.stops(), root.stops()), (1, 1, 1));
    assert!(a.base.done().is_fired());
    assert!(b.base.done().is_fired());
    assert!(root.base.done().is_fired());
    assert!(a.base.stopped_before_start());
    assert!(b.base.stopped_before_start());
    assert!(root.base.stopped_before_start());

    // children in reverse order, all before the parent's own teardown
    assert!(position(&log, "stop:B") < position(&log, "stop:A"));
    assert!(position(&log, "stop:A") < position(&log, "stop:R"));

    // parent still hears about children stopped before start, once each
    let mut done = root.children_done.lock().clone();
    done.sort();
    assert_eq!(done, vec!["A", "B"]);

    // a late start neither runs the body nor repeats the teardown
    node.start().await.unwrap();
    assert_eq!(root.stops(), 1);
}

#[tokio::test]
async fn concurrent_stops_run_teardown_once() {
    let log = log();
    let root = Probe::new("root", Body::UntilStopped, &log);
    let child = Probe::new("child", Body::UntilStopped, &log);
    root.base.add_child(child.clone()).unwrap();

    let node: ComponentRef = root.clone();
    node.init().await.unwrap();
    let handle = node.spawn();
    root.base.started().wait().await;
    child.base.started().wait().await;

    tokio::join!(node.stop(), node.stop(), node.stop());

    assert_eq!(root.stops(), 1);
    assert_eq!(child.stops(), 1);
    assert!(child.base.done().is_fired());
    assert!(handle.await.unwrap().is_ok());
    assert_eq!(*root.children_done.lock(), vec!["child"]);
}

#[tokio::test]
async fn done_is_published_after_every_child_is_done() {
    let bus = Bus::new(256);
    let mut rx = bus.subscribe();
    let log = log();
    let root = Probe::with_base(Component::new("root").with_bus(bus), Body::Return, &log);
    root.base
        .add_child(Probe::new("left", Body::UntilStopped, &log))
        .unwrap();
    root.base
        .add_child(Probe::new("right", Body::UntilStopped, &log))
        .unwrap();

    let node: ComponentRef = root.clone();
    node.run().await.unwrap();

    let mut done_order = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        if ev.kind == EventKind::ComponentDone {
            done_order.push(ev.component.as_deref().unwrap_or_default().to_string());
        }
    }
    assert_eq!(done_order.len(), 3);
    assert_eq!(done_order.last().map(String::as_str), Some("root"));
}

#[tokio::test]
async fn internal_completion_runs_the_stop_flow() {
    let log = log();
    let leaf = Probe::new("leaf", Body::Return, &log);
    let node: ComponentRef = leaf.clone();

    node.run().await.unwrap();

    assert_eq!(leaf.stops(), 1);
    assert!(leaf.base.stopping().is_fired());
    assert!(leaf.base.done().is_fired());
    assert!(leaf.base.token().is_cancelled());
    assert!(!leaf.base.stopped_before_start());

    node.stop().await;
    assert_eq!(leaf.stops(), 1);
}

#[tokio::test]
async fn panicking_body_is_recorded_not_propagated() {
    let log = log();
    let leaf = Probe::new("leaf", Body::Panic, &log);
    let node: ComponentRef = leaf.clone();
    node.init().await.unwrap();

    let err = node.spawn().await.unwrap().unwrap_err();

    assert_eq!(err.len(), 1);
    let first = err.iter().next().unwrap();
    assert!(matches!(
        first,
        ComponentError::Panicked { phase: Phase::Start, message, .. } if message == "body exploded"
    ));
    assert!(leaf.base.done().is_fired());
    assert_eq!(leaf.stops(), 1);
}

#[tokio::test]
async fn child_errors_aggregate_at_the_root() {
    let log = log();
    let root = Probe::new("root", Body::AwaitChildren, &log);
    root.base
        .add_child(Probe::new("db", Body::Fail, &log))
        .unwrap();
    root.base
        .add_child(Probe::new("cache", Body::Fail, &log))
        .unwrap();
    root.base
        .add_child(Probe::new("ok", Body::Return, &log))
        .unwrap();

    let node: ComponentRef = root.clone();
    let err = node.run().await.unwrap_err();

    assert_eq!(err.len(), 2);
    assert!(err.iter().all(|e| e.as_label() == "component_start_failed"));
    assert!(root.base.self_err().is_none());
    assert_eq!(root.base.children_err().map(|e| e.len()), Some(2));
    let text = err.to_string();
    assert!(text.contains("\"db\"") && text.contains("\"cache\""));
}

#[tokio::test]
async fn panicking_child_done_callback_is_recorded_on_parent() {
    let log = log();
    let parent = Arc::new(Probe {
        base: Component::new("parent"),
        body: Body::AwaitChildren,
        log: Arc::clone(&log),
        stops: AtomicUsize::new(0),
        children_done: Mutex::new(Vec::new()),
        panic_on_child_done: true,
    });
    parent
        .base
        .add_child(Probe::new("kid", Body::Return, &log))
        .unwrap();

    let node: ComponentRef = parent.clone();
    let err = node.run().await.unwrap_err();

    assert!(err.iter().any(|e| matches!(
        e,
        ComponentError::Panicked { phase: Phase::ChildDone, .. }
    )));
    assert!(parent.base.done().is_fired());
}

#[tokio::test]
async fn cancelling_the_root_token_stops_the_tree() {
    let log = log();
    let root = Probe::new("root", Body::UntilStopped, &log);
    let child = Probe::new("child", Body::UntilStopped, &log);
    root.base.add_child(child.clone()).unwrap();

    let node: ComponentRef = root.clone();
    node.init().await.unwrap();
    let handle = node.spawn();
    child.base.started().wait().await;

    root.base.token().cancel();
    handle.await.unwrap().unwrap();

    assert!(child.base.token().is_cancelled());
    assert!(child.base.done().is_fired());
    assert_eq!((root.stops(), child.stops()), (1, 1));
    assert!(position(&log, "stop:child") < position(&log, "stop:root"));
}

#[tokio::test]
async fn tree_shape_errors() {
    let log = log();
    let root = Probe::new("root", Body::Return, &log);
    root.base
        .add_child(Probe::new("twin", Body::Return, &log))
        .unwrap();
    let dup = root
        .base
        .add_child(Probe::new("twin", Body::Return, &log))
        .unwrap_err();
    assert_eq!(dup.as_label(), "component_duplicate_child");

    let shared = Probe::new("shared", Body::Return, &log);
    let first = Probe::new("first", Body::Return, &log);
    let second = Probe::new("second", Body::Return, &log);
    first.base.add_child(shared.clone()).unwrap();
    second.base.add_child(shared).unwrap();

    let first: ComponentRef = first;
    let second: ComponentRef = second;
    first.init().await.unwrap();
    let err = second.init().await.unwrap_err();
    assert!(matches!(err, ComponentError::ParentAlreadySet { ref component } if component == "shared"));
}

#[tokio::test]
async fn attributes_flow_through_the_tree() {
    let log = log();
    let root = Probe::new("root", Body::Return, &log);
    root.base.attrs().store("region", "eu-west");
    assert_eq!(root.base.attrs().load_or::<String>("region", String::new()), "eu-west");

    let child = Probe::new("child", Body::Return, &log);
    root.base.add_child(child.clone()).unwrap();
    let node: ComponentRef = root.clone();
    node.init().await.unwrap();

    let parent = child.base.parent().unwrap();
    assert_eq!(parent.component().name(), "root");
    assert!(root.base.child("child").is_some());
    assert!(root.base.child("nobody").is_none());
}

/// Fails `on_init` for the first `failures` calls.
struct ShakyInit {
    base: Component,
    failures: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl Lifecycle for ShakyInit {
    fn component(&self) -> &Component {
        &self.base
    }

    async fn on_init(&self) -> Result<(), BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err("config not ready".into());
        }
        Ok(())
    }
}

#[tokio::test]
async fn failed_init_can_be_retried() {
    let log = log();
    let bus = Bus::new(16);
    let root = Arc::new(ShakyInit {
        base: Component::new("root").with_bus(bus),
        failures: AtomicUsize::new(1),
        calls: AtomicUsize::new(0),
    });
    let child = Probe::new("child", Body::Return, &log);
    root.base.add_child(child.clone()).unwrap();
    let node: ComponentRef = root.clone();

    let err = node.init().await.unwrap_err();
    assert_eq!(err.as_label(), "component_init_failed");
    assert!(child.base.parent().is_none());

    node.init().await.unwrap();
    assert_eq!(root.calls.load(Ordering::SeqCst), 2);
    assert_eq!(child.base.parent().unwrap().component().name(), "root");
    assert!(child.base.bus().is_some());
    root.base.token().cancel();
    assert!(child.base.token().is_cancelled());

    // already initialized: no third on_init
    node.init().await.unwrap();
    assert_eq!(root.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_child_init_retry_reattaches_to_same_parent() {
    let root = Probe::new("root", Body::Return, &log());
    let child = Arc::new(ShakyInit {
        base: Component::new("child"),
        failures: AtomicUsize::new(1),
        calls: AtomicUsize::new(0),
    });
    root.base.add_child(child.clone()).unwrap();
    let node: ComponentRef = root.clone();

    assert!(node.init().await.is_err());
    node.init().await.unwrap();
    assert_eq!(child.calls.load(Ordering::SeqCst), 2);
    assert_eq!(child.base.parent().unwrap().component().name(), "root");
}
