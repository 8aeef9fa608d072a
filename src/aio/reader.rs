//! # Read-ahead over any [`StreamRead`].
//!
//! ```text
//! first read ─► spawn pump (once)
//!
//! pump:   loop { buf = pool.get(buf_size); inner.read(buf) }
//!           ├─ Ok(n > 0) ─► queue.send(buf)      (ownership moves)
//!           ├─ Ok(0)     ─► drop sender          (consumer sees EOF)
//!           └─ Err(e)    ─► sticky.set(e), drop sender
//!
//! read:   head buffer ─► caller slice; head empty ─► free it, recv next
//!         queue closed ─► sticky error or Ok(0)
//!
//! close:  cancel pump ─► free head ─► drain + free queue ─► join pump ─► inner.close()
//! ```

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::AsyncConfig;
use super::sticky::StickyError;
use crate::error::StreamError;
use crate::pool::{BufferPool, PooledBuf};
use crate::rw::StreamRead;

enum State<R> {
    Idle(R),
    Running {
        rx: mpsc::Receiver<PooledBuf>,
        pump: JoinHandle<R>,
    },
    Closed,
}

/// Reader backed by a background pump and a bounded queue of pooled buffers.
///
/// Must be used inside a tokio runtime; the pump is spawned on the first read.
pub struct AsyncReader<R> {
    cfg: AsyncConfig,
    pool: BufferPool,
    state: State<R>,
    head: Option<PooledBuf>,
    sticky: StickyError,
    cancel: CancellationToken,
    closed: bool,
}

impl<R: StreamRead + 'static> AsyncReader<R> {
    /// Wraps `inner`, drawing buffers from the shared pool.
    pub fn new(inner: R, cfg: AsyncConfig) -> Self {
        Self::with_pool(inner, cfg, BufferPool::shared())
    }

    /// Wraps `inner`, drawing buffers from `pool`.
    pub fn with_pool(inner: R, cfg: AsyncConfig, pool: BufferPool) -> Self {
        Self {
            cfg,
            pool,
            state: State::Idle(inner),
            head: None,
            sticky: StickyError::new(),
            cancel: CancellationToken::new(),
            closed: false,
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
        if !matches!(self.state, State::Idle(_)) {
            return;
        }
        if let State::Idle(inner) = std::mem::replace(&mut self.state, State::Closed) {
            let (tx, rx) = mpsc::channel(self.cfg.queue_depth.max(1));
            let pump = tokio::spawn(pump(
                inner,
                self.pool.clone(),
                self.cfg.buf_size,
                tx,
                self.sticky.clone(),
                self.cancel.clone(),
            ));
            self.state = State::Running { rx, pump };
        }
    }
}

async fn pump<R: StreamRead>(
    mut inner: R,
    pool: BufferPool,
    buf_size: usize,
    tx: mpsc::Sender<PooledBuf>,
    sticky: StickyError,
    cancel: CancellationToken,
) -> R {
    loop {
        let mut buf = pool.get(buf_size);
        let res = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            res = inner.read(buf.spare_mut()) => res,
        };
        match res {
            Ok(0) => break,
            Ok(n) => {
                buf.commit(n);
                if tx.send(buf).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "read pump stopped");
                sticky.set(e);
                break;
            }
        }
    }
    inner
}

#[async_trait]
impl<R: StreamRead + 'static> StreamRead for AsyncReader<R> {
    async fn read(&mut self, dst: &mut [u8]) -> Result<usize, StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        if dst.is_empty() {
            return Ok(0);
        }
        self.ensure_started();

        loop {
            if let Some(head) = self.head.as_mut() {
                if head.remaining() > 0 {
                    return Ok(head.take_into(dst));
                }
            }
            if let Some(spent) = self.head.take() {
                spent.free();
            }

            let State::Running { rx, .. } = &mut self.state else {
                return Err(StreamError::Closed);
            };
            match rx.recv().await {
                Some(buf) => self.head = Some(buf),
                None => {
                    return match self.sticky.get() {
                        Some(err) => Err(err),
                        None => Ok(0),
                    };
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cancel.cancel();
        if let Some(head) = self.head.take() {
            head.free();
        }

        let inner = match std::mem::replace(&mut self.state, State::Closed) {
            State::Idle(inner) => inner,
            State::Running { mut rx, pump } => {
                rx.close();
                while let Some(buf) = rx.recv().await {
                    buf.free();
                }
                match pump.await {
                    Ok(inner) => inner,
                    Err(e) => {
                        tracing::warn!(error = %e, "read pump task failed");
                        return Err(StreamError::other(e));
                    }
                }
            }
            State::Closed => return Ok(()),
        };

        let mut inner = inner;
        inner.close().await
    }
}

impl<R> Drop for AsyncReader<R> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
