//! # Hook chain.
//!
//! Hooks observe every underlying read or write of a stage. They are invoked
//! **after** the I/O call, in **reverse registration order**; each hook sees the
//! same [`IoEvent`]. A failing or panicking hook never prevents its siblings from
//! running: every hook error is joined into the operation's result.
//!
//! ```text
//! stage.read(p) ─► HookedReader::read
//!                    ├─ inner.read(p)          (timed)
//!                    └─ hooks[n-1] .. hooks[0] (on_io(&IoEvent))
//!                         └─ errors joined: primary (or Eof) first, then hook errors
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Map, Value};
use tokio::time::Instant;

use super::stream::{StreamRead, StreamWrite};
use crate::error::{StreamError, panic_message};

/// Direction of the I/O a hook observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Bytes read from the nested reader.
    Read,
    /// Bytes written to the nested writer.
    Write,
}

/// What a hook is told about one underlying I/O call.
#[derive(Debug)]
pub struct IoEvent<'a> {
    /// Direction of the call.
    pub direction: Direction,
    /// Bytes transferred.
    pub n: usize,
    /// The transferred bytes (`buf.len() == n`).
    pub buf: &'a [u8],
    /// Error returned by the nested stream, if any.
    pub err: Option<&'a StreamError>,
    /// `true` when the read reported end-of-stream.
    pub eof: bool,
    /// Time spent inside the nested stream.
    pub elapsed: Duration,
    /// Free-form metadata attached to the stage.
    pub meta: &'a Map<String, Value>,
}

/// Callback invoked after every underlying read or write.
#[async_trait]
pub trait Hook: Send + Sync + 'static {
    /// Name used in logs and in [`StreamError::HookPanicked`].
    fn name(&self) -> &'static str;

    /// Observes one I/O call; an error is joined into the caller's result.
    async fn on_io(&self, ev: &IoEvent<'_>) -> Result<(), StreamError>;
}

/// Ordered list of hooks for one direction.
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hook.
    pub fn push(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    /// Appends every hook of `other`, keeping its order.
    pub fn extend(&mut self, other: &HookChain) {
        self.hooks.extend(other.hooks.iter().cloned());
    }

    /// Number of hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns `true` if no hook is registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every hook in reverse registration order and collects their errors.
    pub async fn run(&self, ev: &IoEvent<'_>) -> Vec<StreamError> {
        let mut errors = Vec::new();
        for hook in self.hooks.iter().rev() {
            match AssertUnwindSafe(hook.on_io(ev)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::warn!(hook = hook.name(), %message, "hook panicked");
                    errors.push(StreamError::HookPanicked {
                        hook: hook.name(),
                        message,
                    });
                }
            }
        }
        errors
    }
}

impl std::fmt::Debug for HookChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|h| h.name()))
            .finish()
    }
}

/// Reader that runs a hook chain after every read of `inner`.
pub struct HookedReader<R> {
    inner: R,
    hooks: HookChain,
    meta: Arc<Map<String, Value>>,
}

impl<R> HookedReader<R> {
    /// Wraps `inner`.
    pub fn new(inner: R, hooks: HookChain, meta: Arc<Map<String, Value>>) -> Self {
        Self { inner, hooks, meta }
    }
}

#[async_trait]
impl<R: StreamRead> StreamRead for HookedReader<R> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        let started = Instant::now();
        let res = self.inner.read(buf).await;
        if self.hooks.is_empty() {
            return res;
        }

        let (n, err) = match &res {
            Ok(n) => (*n, None),
            Err(e) => (0, Some(e)),
        };
        // a nested stage may report end-of-stream joined with its own errors
        let eof = !buf.is_empty()
            && match err {
                None => n == 0,
                Some(e) => e.is_eof(),
            };
        let ev = IoEvent {
            direction: Direction::Read,
            n,
            buf: &buf[..n],
            err,
            eof,
            elapsed: started.elapsed(),
            meta: &self.meta,
        };
        let extra = self.hooks.run(&ev).await;

        match StreamError::join(res.err(), eof, extra) {
            Some(e) => Err(e),
            None => Ok(n),
        }
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.inner.close().await
    }
}

/// Writer that runs a hook chain after every write to `inner`.
pub struct HookedWriter<W> {
    inner: W,
    hooks: HookChain,
    meta: Arc<Map<String, Value>>,
}

impl<W> HookedWriter<W> {
    /// Wraps `inner`.
    pub fn new(inner: W, hooks: HookChain, meta: Arc<Map<String, Value>>) -> Self {
        Self { inner, hooks, meta }
    }
}

#[async_trait]
impl<W: StreamWrite> StreamWrite for HookedWriter<W> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StreamError> {
        let started = Instant::now();
        let res = self.inner.write(buf).await;
        if self.hooks.is_empty() {
            return res;
        }

        let (n, err) = match &res {
            Ok(n) => ((*n).min(buf.len()), None),
            Err(e) => (0, Some(e)),
        };
        let ev = IoEvent {
            direction: Direction::Write,
            n,
            buf: &buf[..n],
            err,
            eof: false,
            elapsed: started.elapsed(),
            meta: &self.meta,
        };
        let extra = self.hooks.run(&ev).await;

        match StreamError::join(res.err(), false, extra) {
            Some(e) => Err(e),
            None => Ok(n),
        }
    }

    async fn flush(&mut self) -> Result<(), StreamError> {
        self.inner.flush().await
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Cursor;

    struct Tag {
        name: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl Hook for Tag {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn on_io(&self, _ev: &IoEvent<'_>) -> Result<(), StreamError> {
            self.seen.lock().push(self.name);
            if self.fail {
                return Err(StreamError::Config(self.name.to_string()));
            }
            Ok(())
        }
    }

    struct Boom;

    #[async_trait]
    impl Hook for Boom {
        fn name(&self) -> &'static str {
            "boom"
        }

        async fn on_io(&self, _ev: &IoEvent<'_>) -> Result<(), StreamError> {
            panic!("hook exploded");
        }
    }

    #[tokio::test]
    async fn hooks_run_in_reverse_and_errors_are_joined() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut chain = HookChain::new();
        for (name, fail) in [("first", true), ("second", false), ("third", true)] {
            chain.push(Arc::new(Tag {
                name,
                seen: Arc::clone(&seen),
                fail,
            }));
        }
        chain.push(Arc::new(Boom));

        let mut r = HookedReader::new(Cursor::new(b"xy".to_vec()), chain, Arc::default());
        let mut buf = [0u8; 4];
        let err = r.read(&mut buf).await.unwrap_err();

        assert_eq!(*seen.lock(), vec!["third", "second", "first"]);
        let StreamError::Joined(all) = err else {
            panic!("expected a join, got {err:?}");
        };
        let labels: Vec<_> = all.iter().map(StreamError::as_label).collect();
        assert_eq!(
            labels,
            vec!["stream_hook_panicked", "stream_invalid_config", "stream_invalid_config"]
        );
    }

    #[tokio::test]
    async fn eof_is_reported_once_hooks_pass() {
        let mut r = HookedReader::new(Cursor::new(Vec::new()), HookChain::new(), Arc::default());
        let mut buf = [0u8; 4];
        assert_eq!(r.read(&mut buf).await.unwrap(), 0);
    }
}
