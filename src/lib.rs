//! # stagevisor
//!
//! **Stagevisor** provides two building blocks for tokio services:
//!
//! - a **lifecycle kernel**: components form a tree that is initialized top-down,
//!   started as independent tasks, stopped bottom-up and reports every failure;
//! - **streaming stages**: nestable reader/writer wrappers with synchronous or
//!   background-queue buffering, a hook chain (hash, checksum, rate limit, ...)
//!   and deterministic close ordering, plus the async read-ahead/write-behind
//!   primitive the queue mode is built on.
//!
//! ## Architecture
//! ```text
//!                 ┌──────────────────────────────┐
//!                 │  root: ComponentRef          │  token, signals, errors, attrs
//!                 └──────┬───────────────┬───────┘
//!           init ▼ (attach, child token, span, bus)   ▲ on_child_done
//!        ┌───────────────┐       ┌───────────────┐    │
//!        │ child A       │       │ StageComponent│────┘
//!        └───────────────┘       └──────┬────────┘
//!                                       │ on_start: Stage::run()
//!                                       ▼
//!      nested reader ─► [hooks] ─► Stage(Starter) ─► [hooks] ─► nested writer
//!                         buffered / queued (AsyncReader, AsyncWriter)
//!
//!  Runner / StageComponent ── publish(Event) ──► Bus ──► SubscriberSet ──► Subscribe
//! ```
//!
//! ### Lifecycle
//! ```text
//! created ─► init() ─► start() ─► stopping ─► stop teardown ─► done
//!                         │          ▲
//!                         └ on_start returns (internal completion)
//!                                    │
//!                  stop() / token cancelled (external request)
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                          |
//! |-------------------|----------------------------------------------------------|---------------------------------------------|
//! | **Lifecycle**     | Component tree, signals, cancellation, error aggregation | [`Component`], [`Lifecycle`], [`Runner`]    |
//! | **Stages**        | Nestable streams with buffering and hooks                | [`Stage`], [`StreamRead`], [`StreamWrite`]  |
//! | **Async I/O**     | Read-ahead / write-behind over pooled buffers            | [`AsyncReader`], [`AsyncWriter`]            |
//! | **Buffers**       | Size-class buffer pool with move-only handles            | [`BufferPool`], [`PooledBuf`]               |
//! | **Events**        | Broadcast lifecycle events to subscribers                | [`Bus`], [`Event`], [`Subscribe`]           |
//! | **Errors**        | Typed, cloneable errors that keep every contributor      | [`ComponentError`], [`StreamError`]         |
//! | **Configuration** | Serializable stage capabilities                          | [`StageConfig`], [`RateLimitConfig`]        |
//!
//! ## Optional features
//! - `logging`: exports [`LogWriter`], a subscriber forwarding events to `tracing`.
//!
//! ## Example
//! ```rust
//! use std::io::Cursor;
//! use std::sync::Arc;
//! use stagevisor::{ComponentRef, Role, Runner, Stage, StageComponent, BYTES_READ};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut stage = Stage::new(Role::Starter).with_name("copy");
//!     stage.nest_reader(Cursor::new(b"hello world".to_vec()))?;
//!     stage.nest_writer(Vec::<u8>::new())?;
//!     stage.enable_calc_hash("sha256");
//!
//!     let root: ComponentRef = Arc::new(StageComponent::new("copy", stage)?);
//!     root.run().await?;
//!
//!     assert_eq!(root.component().attrs().load_or::<u64>(BYTES_READ, 0), 11);
//!     Ok(())
//! }
//! ```

mod aio;
mod component;
mod config;
mod error;
mod events;
mod pool;
mod rw;
mod subscribers;

// ---- Public re-exports ----

pub use aio::{AsyncConfig, AsyncReader, AsyncWriter, StickyError};
pub use component::{
    Attributes, Component, ComponentRef, ErrorStore, Lifecycle, Runner, STOPPED_BEFORE_START,
    Signal,
};
pub use config::{RateLimitConfig, StageConfig};
pub use error::{BoxError, ComponentError, MultiError, Phase, SharedError, StreamError};
pub use events::{Bus, Event, EventKind};
pub use pool::{BufferPool, PoolStats, PooledBuf};
pub use rw::hooks;
pub use rw::hooks::{HashAlgorithm, RateLimiter};
pub use rw::{
    BYTES_READ, BYTES_WRITTEN, Direction, HASH, Hook, HookChain, HookedReader, HookedWriter,
    IoEvent, IoReader, IoWriter, Role, Stage, StageComponent, StreamRead, StreamWrite,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: a subscriber that forwards events to `tracing`.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
