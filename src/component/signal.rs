use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

/// One-shot completion signal.
///
/// Fires at most once no matter how often [`fire`](Self::fire) is called; any
/// number of tasks may [`wait`](Self::wait) on it. Clones observe the same signal.
#[derive(Clone, Debug, Default)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

#[derive(Debug, Default)]
struct SignalInner {
    fired: AtomicBool,
    token: CancellationToken,
}

impl Signal {
    /// Creates an unfired signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal. Returns `true` only for the call that fired it.
    pub fn fire(&self) -> bool {
        if self.inner.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.inner.token.cancel();
        true
    }

    /// Returns `true` once the signal has fired.
    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Waits until the signal fires; returns immediately if it already has.
    pub async fn wait(&self) {
        self.inner.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fires_once() {
        let sig = Signal::new();
        let waiter = {
            let sig = sig.clone();
            tokio::spawn(async move { sig.wait().await })
        };

        assert!(!sig.is_fired());
        assert!(sig.fire());
        assert!(!sig.fire());
        assert!(sig.is_fired());
        waiter.await.unwrap();
        sig.wait().await;
    }
}
