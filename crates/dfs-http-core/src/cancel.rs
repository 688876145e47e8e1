//! Hierarchical cancellation signal.
//!
//! Every request context owns a [`Cancellation`]. Calls made on behalf of the
//! request take a [`Cancellation::child`] so that cancelling the request
//! (client gone, deadline hit, server shutdown) reaches every downstream
//! operation, while cancelling a child never affects its parent.
//!
//! # Example
//!
//! ```rust
//! use dfs_http_core::Cancellation;
//!
//! let server = Cancellation::new();
//! let request = server.child();
//! let backend_call = request.child();
//!
//! server.cancel();
//! assert!(request.is_cancelled());
//! assert!(backend_call.is_cancelled());
//! ```

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Node {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<Node>>>,
}

impl Node {
    fn cancel(&self) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.notify.notify_waiters();

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// A cloneable cancellation signal that propagates to its children.
///
/// Clones share the same signal; [`child`](Self::child) creates a new signal
/// that is cancelled together with its parent.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    inner: Arc<Node>,
}

impl Cancellation {
    /// Creates a new, un-cancelled root signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a child signal.
    ///
    /// The child is cancelled when this signal is cancelled. If this signal is
    /// already cancelled, the child starts cancelled.
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Self::new();
        {
            let mut children = self.inner.children.lock();
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        // Checked after registration so a concurrent cancel cannot be missed.
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// Cancels this signal and all of its descendants.
    ///
    /// Calling this multiple times is safe and idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Returns `true` once the signal has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Completes when the signal is cancelled.
    ///
    /// Completes immediately if it already was.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Runs `fut` unless the signal fires first.
    ///
    /// Returns a `Cancelled` error when the signal wins the race.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            () = self.cancelled() => Err(Error::cancelled("operation cancelled")),
            out = fut => Ok(out),
        }
    }

    /// Returns a guard that cancels this signal when dropped.
    #[must_use]
    pub fn drop_guard(&self) -> CancelOnDrop {
        CancelOnDrop {
            signal: Some(self.clone()),
        }
    }
}

/// Cancels its signal when dropped, unless [`disarm`](Self::disarm)ed.
#[derive(Debug)]
pub struct CancelOnDrop {
    signal: Option<Cancellation>,
}

impl CancelOnDrop {
    /// Prevents the guard from cancelling on drop.
    pub fn disarm(mut self) {
        self.signal = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.take() {
            signal.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_is_idempotent() {
        let signal = Cancellation::new();
        assert!(!signal.is_cancelled());
        signal.cancel();
        signal.cancel();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_child_follows_parent_not_reverse() {
        let parent = Cancellation::new();
        let child = parent.child();
        let grandchild = child.child();

        child.cancel();
        assert!(!parent.is_cancelled());
        assert!(grandchild.is_cancelled());

        let sibling = parent.child();
        parent.cancel();
        assert!(sibling.is_cancelled());
    }

    #[test]
    fn test_child_of_cancelled_parent_starts_cancelled() {
        let parent = Cancellation::new();
        parent.cancel();
        assert!(parent.child().is_cancelled());
    }

    #[test]
    fn test_dropped_children_are_pruned() {
        let parent = Cancellation::new();
        for _ in 0..10 {
            let _ = parent.child();
        }
        let _live = parent.child();
        assert_eq!(parent.inner.children.lock().len(), 1);
    }

    #[test]
    fn test_drop_guard() {
        let signal = Cancellation::new();
        drop(signal.drop_guard());
        assert!(signal.is_cancelled());

        let other = Cancellation::new();
        other.drop_guard().disarm();
        assert!(!other.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let signal = Cancellation::new();
        let child = signal.child();
        let waiter = tokio::spawn(async move { child.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("task should not panic");
    }

    #[tokio::test]
    async fn test_run_returns_cancelled() {
        let signal = Cancellation::new();
        signal.cancel();
        let err = signal
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(err.is_code(crate::ErrorCode::Cancelled));

        let live = Cancellation::new();
        assert_eq!(live.run(async { 7 }).await.unwrap(), 7);
    }
}
