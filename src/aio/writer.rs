//! # Write-behind over any [`StreamWrite`].
//!
//! ```text
//! write:  caller bytes ─► tail buffer ─► full? ─► queue.send(tail)
//! ticker: every `deadline`, a non-empty tail idle for >= deadline is sent
//! pump:   queue.recv() ─► inner.write(buf) ─► free(buf)
//!           └─ Err(e) ─► sticky.set(e), close queue, keep draining (free only)
//! close:  send tail ─► drop sender ─► join ticker + pump ─► inner.close()
//! ```
//!
//! The tail and the sender sit behind one async mutex that is held across the
//! send, so buffers reach the queue in write order whether the writer or the
//! ticker hands them over.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::AsyncConfig;
use super::sticky::StickyError;
use crate::error::StreamError;
use crate::pool::{BufferPool, PooledBuf};
use crate::rw::StreamWrite;
use crate::rw::write_all;

struct WriteSide {
    tail: Option<PooledBuf>,
    tx: Option<mpsc::Sender<PooledBuf>>,
    last_write: Instant,
}

impl WriteSide {
    /// Hands the tail to the pump; empty tails are freed in place.
    async fn send_tail(&mut self, sticky: &StickyError) -> Result<(), StreamError> {
        let Some(buf) = self.tail.take() else {
            return Ok(());
        };
        if buf.is_empty() {
            buf.free();
            return Ok(());
        }
        let Some(tx) = self.tx.as_ref() else {
            return Err(StreamError::Closed);
        };
        if tx.send(buf).await.is_err() {
            return Err(sticky.get().unwrap_or(StreamError::Closed));
        }
        Ok(())
    }
}

enum State<W> {
    Idle {
        inner: W,
        rx: mpsc::Receiver<PooledBuf>,
    },
    Running {
        pump: JoinHandle<W>,
        ticker: Option<JoinHandle<()>>,
    },
    Closed,
}

/// Writer handing pooled buffers to a background pump.
///
/// `flush` hands the partial tail to the pump without waiting for it to be
/// written; `close` waits for everything.
pub struct AsyncWriter<W> {
    cfg: AsyncConfig,
    pool: BufferPool,
    side: Arc<Mutex<WriteSide>>,
    state: State<W>,
    sticky: StickyError,
    cancel: CancellationToken,
    closed: Option<Result<(), StreamError>>,
}

impl<W: StreamWrite + 'static> AsyncWriter<W> {
    /// Wraps `inner`, drawing buffers from the shared pool.
    pub fn new(inner: W, cfg: AsyncConfig) -> Self {
        Self::with_pool(inner, cfg, BufferPool::shared())
    }

    /// Wraps `inner`, drawing buffers from `pool`.
    pub fn with_pool(inner: W, cfg: AsyncConfig, pool: BufferPool) -> Self {
        let (tx, rx) = mpsc::channel(cfg.queue_depth.max(1));
        Self {
            cfg,
            pool,
            side: Arc::new(Mutex::new(WriteSide {
                tail: None,
                tx: Some(tx),
                last_write: Instant::now(),
            })),
            state: State::Idle { inner, rx },
            sticky: StickyError::new(),
            cancel: CancellationToken::new(),
            closed: None,
        }
    }

    /// Returns `true` once the pump was spawned.
    pub fn is_started(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }

    /// First error recorded by the pump.
    pub fn sticky_error(&self) -> Option<StreamError> {
        self.sticky.get()
    }

    fn ensure_started(&mut self) {
        if !matches!(self.state, State::Idle { .. }) {
            return;
        }
        if let State::Idle { inner, rx } = std::mem::replace(&mut self.state, State::Closed) {
            let pump = tokio::spawn(pump(inner, rx, self.sticky.clone()));
            let ticker = self.cfg.has_deadline().then(|| {
                tokio::spawn(deadline_flush(
                    Arc::clone(&self.side),
                    self.sticky.clone(),
                    self.cfg.deadline,
                    self.cancel.clone(),
                ))
            });
            self.state = State::Running { pump, ticker };
        }
    }

    async fn shutdown(&mut self) -> Result<(), StreamError> {
        let mut first = None;
        {
            let mut side = self.side.lock().await;
            if let Err(e) = side.send_tail(&self.sticky).await {
                first = Some(e);
            }
            side.tx = None;
        }
        self.cancel.cancel();

        let inner = match std::mem::replace(&mut self.state, State::Closed) {
            State::Idle { inner, .. } => Some(inner),
            State::Running { pump, ticker } => {
                if let Some(ticker) = ticker {
                    if let Err(e) = ticker.await {
                        tracing::debug!(error = %e, "deadline ticker ended abnormally");
                    }
                }
                match pump.await {
                    Ok(inner) => Some(inner),
                    Err(e) => {
                        tracing::warn!(error = %e, "write pump task failed");
                        first.get_or_insert(StreamError::other(e));
                        None
                    }
                }
            }
            State::Closed => None,
        };

        if let Some(err) = self.sticky.get() {
            first = Some(err);
        }
        if let Some(mut inner) = inner {
            if let Err(e) = inner.close().await {
                first.get_or_insert(e);
            }
        }
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn pump<W: StreamWrite>(
    mut inner: W,
    mut rx: mpsc::Receiver<PooledBuf>,
    sticky: StickyError,
) -> W {
    while let Some(buf) = rx.recv().await {
        if !sticky.is_set() {
            if let Err(e) = write_all(&mut inner, buf.filled()).await {
                tracing::debug!(error = %e, "write pump stopped");
                sticky.set(e);
                rx.close();
            }
        }
        buf.free();
    }
    inner
}

async fn deadline_flush(
    side: Arc<Mutex<WriteSide>>,
    sticky: StickyError,
    deadline: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut tick = tokio::time::interval(deadline);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tick.tick() => {}
        }
        let mut side = side.lock().await;
        if side.tx.is_none() {
            return;
        }
        let stale = side.tail.as_ref().is_some_and(|t| !t.is_empty())
            && side.last_write.elapsed() >= deadline;
        if stale {
            if let Err(e) = side.send_tail(&sticky).await {
                tracing::debug!(error = %e, "deadline flush failed");
                return;
            }
        }
    }
}

#[async_trait]
impl<W: StreamWrite + 'static> StreamWrite for AsyncWriter<W> {
    async fn write(&mut self, src: &[u8]) -> Result<usize, StreamError> {
        if self.closed.is_some() {
            return Err(StreamError::Closed);
        }
        if let Some(err) = self.sticky.get() {
            return Err(err);
        }
        self.ensure_started();

        let mut side = self.side.lock().await;
        let mut rest = src;
        while !rest.is_empty() {
            let tail = side
                .tail
                .get_or_insert_with(|| self.pool.get(self.cfg.buf_size));
            let n = tail.append(rest);
            rest = &rest[n..];
            if tail.is_full() {
                side.send_tail(&self.sticky).await?;
            }
        }
        side.last_write = Instant::now();
        Ok(src.len())
    }

    async fn flush(&mut self) -> Result<(), StreamError> {
        if self.closed.is_some() {
            return Err(StreamError::Closed);
        }
        if let Some(err) = self.sticky.get() {
            return Err(err);
        }
        self.side.lock().await.send_tail(&self.sticky).await
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        if let Some(res) = &self.closed {
            return res.clone();
        }
        let res = self.shutdown().await;
        self.closed = Some(res.clone());
        res
    }
}

impl<W> Drop for AsyncWriter<W> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
