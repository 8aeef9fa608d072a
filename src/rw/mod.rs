//! Streaming pipeline stages.
//!
//! - [`StreamRead`]/[`StreamWrite`]: the byte stream contracts everything nests through.
//! - [`Stage`]: reader/writer wrapper with buffering, queueing and a hook chain.
//! - [`hooks`]: built-in hooks (count, hash, checksum, rate limit, speed, stop).
//! - [`StageComponent`]: runs a `Starter` stage under the lifecycle kernel.

mod component;
mod hook;
pub mod hooks;
mod stage;
mod stream;

pub use component::{BYTES_READ, BYTES_WRITTEN, HASH, StageComponent};
pub use hook::{Direction, Hook, HookChain, HookedReader, HookedWriter, IoEvent};
pub use stage::{Role, Stage};
pub use stream::{IoReader, IoWriter, StreamRead, StreamWrite};

pub(crate) use stream::write_all;
