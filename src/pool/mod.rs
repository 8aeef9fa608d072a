//! Pooled buffer arena.
//!
//! - [`BufferPool`] keeps one free list per buffer size, filled on demand;
//! - [`PooledBuf`] is the checked-out handle, returned to its pool exactly once.
//!
//! Ownership of a buffer moves with the value: sending a [`PooledBuf`] through a
//! queue hands it to the receiver, and the last owner returns it by calling
//! [`PooledBuf::free`] (or by dropping it).

mod arena;
mod buffer;

pub use arena::{BufferPool, PoolStats};
pub use buffer::PooledBuf;
