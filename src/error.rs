//! Error types used by the lifecycle kernel and the streaming stages.
//!
//! This module defines:
//!
//! - [`ComponentError`]: errors raised by component init/start/stop bodies or by the kernel itself.
//! - [`MultiError`]: an ordered join of component errors that keeps every contributor.
//! - [`StreamError`]: errors raised by readers, writers, hooks and background pumps.
//!
//! Both enums provide helper methods (`as_label`, `as_message`) for logging, and are
//! `Clone` so a sticky error can be handed out more than once.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::rw::Role;

/// Boxed error returned by user supplied lifecycle bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared, cloneable error source.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Lifecycle phase an error or panic was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// `Lifecycle::on_init`.
    Init,
    /// `Lifecycle::on_start`.
    Start,
    /// `Lifecycle::on_stop`.
    Stop,
    /// `Lifecycle::on_child_done` on the parent.
    ChildDone,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Init => "init",
            Phase::Start => "start",
            Phase::Stop => "stop",
            Phase::ChildDone => "child_done",
        })
    }
}

/// # Errors produced by components and the lifecycle kernel.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ComponentError {
    /// `on_init` returned an error.
    #[error("component {component:?} init failed: {source}")]
    Init {
        /// Name of the failing component.
        component: String,
        /// Underlying error.
        #[source]
        source: SharedError,
    },

    /// `on_start` returned an error.
    #[error("component {component:?} start failed: {source}")]
    Start {
        /// Name of the failing component.
        component: String,
        /// Underlying error.
        #[source]
        source: SharedError,
    },

    /// `on_stop` returned an error.
    #[error("component {component:?} stop failed: {source}")]
    Stop {
        /// Name of the failing component.
        component: String,
        /// Underlying error.
        #[source]
        source: SharedError,
    },

    /// A body panicked; the panic was caught at the kernel boundary.
    #[error("component {component:?} panicked during {phase}: {message}")]
    Panicked {
        /// Name of the panicking component.
        component: String,
        /// Phase the panic happened in.
        phase: Phase,
        /// Panic payload rendered as text.
        message: String,
    },

    /// A child with the same name is already registered.
    #[error("component {parent:?} already has a child named {child:?}")]
    DuplicateChild {
        /// Parent name.
        parent: String,
        /// Duplicate child name.
        child: String,
    },

    /// The component was attached to a second parent.
    #[error("component {component:?} already has a parent")]
    ParentAlreadySet {
        /// Name of the component.
        component: String,
    },

    /// Several errors joined together.
    #[error("{0}")]
    Multiple(MultiError),
}

impl ComponentError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use stagevisor::ComponentError;
    ///
    /// let err = ComponentError::ParentAlreadySet { component: "db".into() };
    /// assert_eq!(err.as_label(), "component_parent_already_set");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ComponentError::Init { .. } => "component_init_failed",
            ComponentError::Start { .. } => "component_start_failed",
            ComponentError::Stop { .. } => "component_stop_failed",
            ComponentError::Panicked { .. } => "component_panicked",
            ComponentError::DuplicateChild { .. } => "component_duplicate_child",
            ComponentError::ParentAlreadySet { .. } => "component_parent_already_set",
            ComponentError::Multiple(_) => "component_multiple",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ComponentError::Init { source, .. } => format!("init: {source}"),
            ComponentError::Start { source, .. } => format!("start: {source}"),
            ComponentError::Stop { source, .. } => format!("stop: {source}"),
            ComponentError::Panicked { phase, message, .. } => {
                format!("panic in {phase}: {message}")
            }
            ComponentError::DuplicateChild { child, .. } => format!("duplicate child: {child}"),
            ComponentError::ParentAlreadySet { component } => {
                format!("parent already set: {component}")
            }
            ComponentError::Multiple(m) => format!("{} errors: {m}", m.len()),
        }
    }

    /// Returns `true` if this error (or any joined member) is a recovered panic.
    pub fn is_panic(&self) -> bool {
        match self {
            ComponentError::Panicked { .. } => true,
            ComponentError::Multiple(m) => m.iter().any(ComponentError::is_panic),
            _ => false,
        }
    }

    pub(crate) fn init(component: &str, source: BoxError) -> Self {
        ComponentError::Init {
            component: component.to_string(),
            source: Arc::from(source),
        }
    }

    pub(crate) fn start(component: &str, source: BoxError) -> Self {
        ComponentError::Start {
            component: component.to_string(),
            source: Arc::from(source),
        }
    }

    pub(crate) fn stop(component: &str, source: BoxError) -> Self {
        ComponentError::Stop {
            component: component.to_string(),
            source: Arc::from(source),
        }
    }
}

/// Ordered join of [`ComponentError`]s.
///
/// Joining never drops a contributor: nested joins are flattened so every
/// original error stays inspectable through [`MultiError::iter`].
#[derive(Debug, Clone, Default)]
pub struct MultiError {
    errors: Vec<ComponentError>,
}

impl MultiError {
    /// Creates an empty join.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an error, flattening nested joins.
    pub fn push(&mut self, err: ComponentError) {
        match err {
            ComponentError::Multiple(inner) => self.errors.extend(inner.errors),
            other => self.errors.push(other),
        }
    }

    /// Appends every error of `other`.
    pub fn extend(&mut self, other: MultiError) {
        self.errors.extend(other.errors);
    }

    /// Number of joined errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns `true` if nothing was joined.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterates the joined errors in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, ComponentError> {
        self.errors.iter()
    }

    /// Returns `None` when empty, so callers can use it as an optional error.
    pub fn into_option(self) -> Option<MultiError> {
        if self.is_empty() { None } else { Some(self) }
    }

    /// Consumes the join and returns the underlying errors.
    pub fn into_inner(self) -> Vec<ComponentError> {
        self.errors
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

impl From<MultiError> for ComponentError {
    fn from(m: MultiError) -> Self {
        ComponentError::Multiple(m)
    }
}

/// # Errors produced by streams, hooks and background pumps.
///
/// End-of-stream is normally reported as `Ok(0)`; [`StreamError::Eof`] only appears
/// inside a [`StreamError::Joined`] when a hook fails on the terminal read, so the
/// caller still learns the stream ended (see [`StreamError::is_eof`]).
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum StreamError {
    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(Arc<io::Error>),

    /// End of stream, carried inside a join.
    #[error("end of stream")]
    Eof,

    /// Checksum configured for the stream does not match the computed digest.
    #[error("checksum mismatch ({algorithm}): expected {expected}, got {actual}")]
    Checksum {
        /// Hash algorithm name.
        algorithm: String,
        /// Configured digest.
        expected: String,
        /// Computed digest.
        actual: String,
    },

    /// Hash algorithm name does not resolve to an implementation.
    #[error("unknown hash algorithm {name:?}")]
    UnknownHash {
        /// Requested name.
        name: String,
    },

    /// Operation is not available for the stage role.
    #[error("{op} is not supported by a {role:?} stage")]
    Role {
        /// Attempted operation.
        op: &'static str,
        /// Role of the stage.
        role: Role,
    },

    /// Nested stream layout violates the role invariants.
    #[error("invalid nesting: {0}")]
    Nesting(String),

    /// A nested stream is already attached and cannot be pushed down.
    #[error("a nested {0} is already attached")]
    AlreadyNested(&'static str),

    /// Invalid stage configuration.
    #[error("invalid stage config: {0}")]
    Config(String),

    /// The stream was used after close.
    #[error("stream closed")]
    Closed,

    /// The stage owner requested a stop.
    #[error("stop requested")]
    Stopped,

    /// The rate limiter could not admit the bytes within the configured wait.
    #[error("rate limit wait exceeded {waited:?}")]
    RateLimitTimeout {
        /// Maximum wait that was exceeded.
        waited: Duration,
    },

    /// A hook panicked; the panic was caught.
    #[error("hook {hook} panicked: {message}")]
    HookPanicked {
        /// Hook name.
        hook: &'static str,
        /// Panic payload rendered as text.
        message: String,
    },

    /// Error raised by a custom stream implementation.
    #[error("{0}")]
    Other(SharedError),

    /// Several errors joined together (primary first).
    #[error("{}", join_display(.0))]
    Joined(Vec<StreamError>),
}

fn join_display(errors: &[StreamError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl StreamError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use stagevisor::StreamError;
    ///
    /// assert_eq!(StreamError::Closed.as_label(), "stream_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            StreamError::Io(_) => "stream_io",
            StreamError::Eof => "stream_eof",
            StreamError::Checksum { .. } => "stream_checksum_mismatch",
            StreamError::UnknownHash { .. } => "stream_unknown_hash",
            StreamError::Role { .. } => "stream_wrong_role",
            StreamError::Nesting(_) => "stream_invalid_nesting",
            StreamError::AlreadyNested(_) => "stream_already_nested",
            StreamError::Config(_) => "stream_invalid_config",
            StreamError::Closed => "stream_closed",
            StreamError::Stopped => "stream_stopped",
            StreamError::RateLimitTimeout { .. } => "stream_rate_limit_timeout",
            StreamError::HookPanicked { .. } => "stream_hook_panicked",
            StreamError::Other(_) => "stream_other",
            StreamError::Joined(_) => "stream_joined",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }

    /// Returns `true` if the error marks (or wraps) end-of-stream.
    ///
    /// A checksum mismatch is only ever detected at end-of-stream, so it counts.
    pub fn is_eof(&self) -> bool {
        match self {
            StreamError::Eof | StreamError::Checksum { .. } => true,
            StreamError::Joined(all) => all.iter().any(StreamError::is_eof),
            _ => false,
        }
    }

    /// Wraps any error type.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StreamError::Other(Arc::new(err))
    }

    /// Joins an optional primary error (or end-of-stream) with hook errors.
    ///
    /// Returns `None` when there is nothing to report. A single error is returned
    /// as is; an end-of-stream joined with hook errors becomes
    /// `Joined([Eof, hook errors...])`.
    pub fn join(primary: Option<StreamError>, eof: bool, extra: Vec<StreamError>) -> Option<Self> {
        if extra.is_empty() {
            return primary;
        }
        let mut all = Vec::with_capacity(extra.len() + 1);
        match primary {
            Some(StreamError::Joined(inner)) => all.extend(inner),
            Some(e) => all.push(e),
            None if eof => all.push(StreamError::Eof),
            None => {}
        }
        all.extend(extra);
        if all.len() == 1 {
            all.pop()
        } else {
            Some(StreamError::Joined(all))
        }
    }
}

impl From<io::Error> for StreamError {
    fn from(err: io::Error) -> Self {
        StreamError::Io(Arc::new(err))
    }
}

/// Renders a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_error_flattens_nested_joins() {
        let mut inner = MultiError::new();
        inner.push(ComponentError::ParentAlreadySet { component: "a".into() });
        inner.push(ComponentError::ParentAlreadySet { component: "b".into() });

        let mut outer = MultiError::new();
        outer.push(ComponentError::Multiple(inner));
        outer.push(ComponentError::DuplicateChild {
            parent: "root".into(),
            child: "c".into(),
        });

        assert_eq!(outer.len(), 3);
        assert_eq!(outer.to_string().lines().count(), 3);
    }

    #[test]
    fn join_keeps_eof_when_hooks_fail() {
        let err = StreamError::join(None, true, vec![StreamError::Stopped]).unwrap();
        assert!(err.is_eof());
        assert!(matches!(err, StreamError::Joined(ref v) if v.len() == 2));
    }

    #[test]
    fn join_without_hook_errors_returns_primary() {
        assert!(StreamError::join(None, true, vec![]).is_none());
        let err = StreamError::join(Some(StreamError::Closed), false, vec![]).unwrap();
        assert_eq!(err.as_label(), "stream_closed");
    }

    #[test]
    fn panic_payloads_render() {
        let s: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(s.as_ref()), "boom");
        let s: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(s.as_ref()), "bang");
        let s: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(s.as_ref()), "unknown panic");
    }
}
