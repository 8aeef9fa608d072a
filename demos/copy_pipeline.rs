//! # Parallel copy pipeline
//!
//! Demonstrates:
//! - a root component supervising two stage components
//! - buffered and queued stages with hashing and a rate limit
//! - lifecycle and stream events forwarded to `LogWriter`
//!
//! Run with:
//! ```text
//! RUST_LOG=debug cargo run --example copy_pipeline --features logging
//! ```

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

use stagevisor::{
    AsyncConfig, BYTES_WRITTEN, BoxError, Bus, Component, ComponentRef, HASH, IoWriter,
    Lifecycle, LogWriter, RateLimiter, Role, Runner, Stage, StageComponent, SubscriberSet,
};

/// Starts its children and finishes when all of them are done.
struct Group {
    base: Component,
}

#[async_trait]
impl Lifecycle for Group {
    fn component(&self) -> &Component {
        &self.base
    }

    async fn on_start(&self) -> Result<(), BoxError> {
        for handle in self.base.start_children() {
            let _ = handle.await;
        }
        Ok(())
    }

    fn on_child_done(&self, child: &ComponentRef) {
        let c = child.component();
        println!(
            "{:>8}: {} bytes, sha256 {}",
            c.name(),
            c.attrs().load_or::<u64>(BYTES_WRITTEN, 0),
            c.attrs().load_or::<String>(HASH, "-".into()),
        );
    }
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn buffered_copy() -> Result<ComponentRef, BoxError> {
    let mut stage = Stage::new(Role::Starter).with_name("buffered");
    stage.nest_reader(Cursor::new(payload(256 * 1024)))?;
    stage.nest_writer(IoWriter(tokio::io::sink()))?;
    stage
        .enable_read_buf(16 * 1024)
        .enable_write_buf(16 * 1024)
        .enable_calc_hash("sha256");
    Ok(Arc::new(StageComponent::new("buffered", stage)?))
}

fn queued_copy() -> Result<ComponentRef, BoxError> {
    let queue = AsyncConfig {
        buf_size: 8 * 1024,
        queue_depth: 4,
        deadline: Duration::from_millis(100),
    };
    let mut stage = Stage::new(Role::Starter).with_name("queued");
    stage.nest_reader(Cursor::new(payload(64 * 1024)))?;
    stage.nest_writer(IoWriter(tokio::io::sink()))?;
    stage
        .enable_async_read(queue.clone())
        .enable_async_write(queue)
        .enable_calc_hash("sha256")
        .enable_rate_limit(Arc::new(RateLimiter::new(128 * 1024, 16 * 1024)))
        .enable_monitor_speed(Duration::from_millis(100));
    Ok(Arc::new(StageComponent::new("queued", stage)?))
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let bus = Bus::default();
    let root = Arc::new(Group {
        base: Component::new("pipeline").with_bus(bus.clone()),
    });
    root.base.add_child(buffered_copy()?)?;
    root.base.add_child(queued_copy()?)?;
    let node: ComponentRef = root;

    let set = Arc::new(SubscriberSet::new(vec![Arc::new(LogWriter::new())], bus.clone()));
    let listener = bus.forward(Arc::clone(&set), node.component().token());

    let res = node.run().await;

    listener.await?;
    if let Ok(set) = Arc::try_unwrap(set) {
        set.shutdown().await;
    }

    res.map_err(Into::into)
}
