//! Broadcast-once close signal.
//!
//! A `Signal` is the lifetime token shared by a portal, its protocol pumps and
//! every endpoint derived from it. Closing drops the only sender of an
//! internal channel, which wakes every pending `done()` at once.

use crate::task;

use flume::{Receiver, Sender};
use futures::FutureExt;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Process-lifetime root. Nothing in this crate closes it.
static PROCESS: Lazy<Signal> = Lazy::new(Signal::new);

/// Cloneable close-once cancellation token.
#[derive(Clone)]
pub struct Signal {
    inner: Arc<Inner>,
}

struct Inner {
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl Signal {
    /// Create an open signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = flume::bounded(0);
        Self {
            inner: Arc::new(Inner {
                tx: Mutex::new(Some(tx)),
                rx,
            }),
        }
    }

    /// The default root used when a portal is built without an explicit
    /// cancellation source.
    #[must_use]
    pub fn process() -> Self {
        PROCESS.clone()
    }

    /// Derive a signal that closes when `self` closes.
    ///
    /// The child can also be closed on its own without affecting the parent.
    /// Must be called from within a compio runtime (a watcher task is spawned).
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Self::new();
        if self.is_closed() {
            child.close();
            return child;
        }

        let parent = self.clone();
        let watched = child.clone();
        task::spawn(async move {
            futures::select! {
                _ = parent.done().fuse() => {
                    watched.close();
                }
                _ = watched.done().fuse() => {}
            }
        });
        child
    }

    /// Close the signal.
    ///
    /// Idempotent; returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        self.inner.tx.lock().take().is_some()
    }

    /// Check whether the signal has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.rx.is_disconnected()
    }

    /// Resolve once the signal is closed.
    pub async fn done(&self) {
        // Nothing is ever sent: the only way out is disconnection.
        let _ = self.inner.rx.recv_async().await;
    }

    /// Whether both handles refer to the same signal.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_close_is_idempotent() {
        let signal = Signal::new();
        assert!(!signal.is_closed());
        assert!(signal.close());
        assert!(!signal.close());
        assert!(signal.is_closed());
    }

    #[test]
    fn test_clones_share_state() {
        let a = Signal::new();
        let b = a.clone();
        a.close();
        assert!(b.is_closed());
        assert!(a.same_as(&b));
        assert!(!a.same_as(&Signal::new()));
    }

    #[compio::test]
    async fn test_done_wakes_all_waiters() {
        let signal = Signal::new();
        let closer = signal.clone();

        let waiters = async {
            futures::join!(signal.done(), signal.done(), signal.done());
        };
        // Polled after the waiters have registered.
        let close = async move {
            closer.close();
        };

        let result = compio::time::timeout(Duration::from_secs(1), async {
            futures::join!(waiters, close);
        })
        .await;
        assert!(result.is_ok(), "waiters were not released by close");
    }

    #[compio::test]
    async fn test_done_pending_while_open() {
        let signal = Signal::new();
        let result = compio::time::timeout(Duration::from_millis(20), signal.done()).await;
        assert!(result.is_err());
    }

    #[compio::test]
    async fn test_child_follows_parent() {
        let parent = Signal::new();
        let child = parent.child();

        parent.close();
        let result = compio::time::timeout(Duration::from_secs(1), child.done()).await;
        assert!(result.is_ok());
        assert!(child.is_closed());
    }

    #[compio::test]
    async fn test_child_close_leaves_parent_open() {
        let parent = Signal::new();
        let child = parent.child();

        child.close();
        compio::time::sleep(Duration::from_millis(5)).await;
        assert!(!parent.is_closed());
    }

    #[compio::test]
    async fn test_child_of_closed_parent() {
        let parent = Signal::new();
        parent.close();
        assert!(parent.child().is_closed());
    }
}
