//! Cooperative cancellation
//!
//! A [`CancellationToken`] is the signal handed to [`Line::start`] and
//! threaded into every task execution. The line derives a child token from
//! the one it is started with, so cancelling the caller's token stops the
//! line, while [`Line::cancel`] only stops this line.
//!
//! Tasks are never preempted. A long task is expected to poll
//! [`is_cancelled`](CancellationToken::is_cancelled), use
//! [`check`](CancellationToken::check) with `?`, or sleep through
//! [`wait_timeout`](CancellationToken::wait_timeout).
//!
//! ```rust
//! use assembly_line::CancellationToken;
//!
//! let parent = CancellationToken::new();
//! let child = parent.child();
//!
//! parent.cancel();
//! assert!(child.is_cancelled());
//! ```
//!
//! [`Line::start`]: crate::Line::start
//! [`Line::cancel`]: crate::Line::cancel

use crate::core::{LineError, Result};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

static NEXT_CALLBACK_ID: AtomicUsize = AtomicUsize::new(1);

fn next_callback_id() -> usize {
    NEXT_CALLBACK_ID.fetch_add(1, Ordering::Relaxed)
}

/// Why a token was cancelled
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancellationReason {
    /// Explicit `cancel()` call
    Manual,
    /// The timeout given to [`CancellationToken::with_timeout`] elapsed
    Timeout(Duration),
    /// The parent token was cancelled
    ParentCancelled,
    /// The line finished draining and shut down
    LineTerminated,
    /// Custom cancellation reason
    Custom(String),
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancellationReason::Manual => write!(f, "manually cancelled"),
            CancellationReason::Timeout(d) => write!(f, "timeout after {:?}", d),
            CancellationReason::ParentCancelled => write!(f, "parent was cancelled"),
            CancellationReason::LineTerminated => write!(f, "line terminated"),
            CancellationReason::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

struct StoredCallback {
    id: usize,
    callback: Box<dyn FnOnce() + Send + Sync>,
}

struct TokenInner {
    cancelled: AtomicBool,
    children: RwLock<Vec<Weak<TokenInner>>>,
    callbacks: Mutex<Vec<StoredCallback>>,
    reason: RwLock<Option<CancellationReason>>,
    // Sleepers in `wait_timeout` park here.
    parked: Mutex<()>,
    wakeup: Condvar,
}

impl TokenInner {
    fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            children: RwLock::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            reason: RwLock::new(None),
            parked: Mutex::new(()),
            wakeup: Condvar::new(),
        }
    }
}

/// A thread-safe cancellation token shared between a line, its tasks, and the caller
///
/// Clones share state. Cancellation is one-way and idempotent: only the
/// first call records a reason and runs callbacks.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

impl CancellationToken {
    /// Create a new token (not cancelled)
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner::new()),
        }
    }

    /// Creates a child token that is cancelled together with this one
    ///
    /// A child of an already cancelled token starts out cancelled with
    /// [`CancellationReason::ParentCancelled`].
    pub fn child(&self) -> Self {
        let child = CancellationToken {
            inner: Arc::new(TokenInner::new()),
        };

        {
            let mut children = self.inner.children.write();
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }

        if self.is_cancelled() {
            child.cancel_with_reason(CancellationReason::ParentCancelled);
        }

        child
    }

    /// Creates a token that cancels itself after `timeout`
    ///
    /// Useful for racing [`Line::finish`](crate::Line::finish) against a
    /// deadline: start the line with a timed token, or cancel on expiry.
    ///
    /// ```rust
    /// use assembly_line::{CancellationReason, CancellationToken};
    /// use std::time::Duration;
    ///
    /// let token = CancellationToken::with_timeout(Duration::from_millis(20));
    /// assert!(token.wait_timeout(Duration::from_secs(5)));
    /// assert_eq!(token.reason(), Some(CancellationReason::Timeout(Duration::from_millis(20))));
    /// ```
    pub fn with_timeout(timeout: Duration) -> Self {
        let token = Self::new();
        let timer = token.clone();

        std::thread::spawn(move || {
            if !timer.wait_timeout(timeout) {
                timer.cancel_with_reason(CancellationReason::Timeout(timeout));
            }
        });

        token
    }

    /// Cancel with [`CancellationReason::Manual`]
    pub fn cancel(&self) {
        self.cancel_with_reason(CancellationReason::Manual);
    }

    /// Cancel with a specific reason
    ///
    /// Runs registered callbacks, wakes sleepers, then cancels children.
    pub fn cancel_with_reason(&self, reason: CancellationReason) {
        {
            // Held across the swap so `reason()` never sees a cancelled token without one.
            let mut slot = self.inner.reason.write();
            if self.inner.cancelled.swap(true, Ordering::SeqCst) {
                return;
            }
            *slot = Some(reason);
        }

        let callbacks: Vec<_> = self.inner.callbacks.lock().drain(..).collect();
        for stored in callbacks {
            (stored.callback)();
        }

        {
            let _parked = self.inner.parked.lock();
            self.inner.wakeup.notify_all();
        }

        let children: Vec<_> = self.inner.children.read().clone();
        for child_weak in children {
            if let Some(child_inner) = child_weak.upgrade() {
                CancellationToken { inner: child_inner }
                    .cancel_with_reason(CancellationReason::ParentCancelled);
            }
        }
    }

    /// Whether the token has been cancelled (lock-free)
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// The cancellation reason, `None` while not cancelled
    pub fn reason(&self) -> Option<CancellationReason> {
        self.inner.reason.read().clone()
    }

    /// Returns [`LineError::Cancelled`] once cancelled, `Ok(())` otherwise
    ///
    /// ```rust
    /// use assembly_line::{CancellationToken, Result};
    ///
    /// fn crunch(token: &CancellationToken) -> Result<u64> {
    ///     let mut total = 0;
    ///     for i in 0..1_000 {
    ///         token.check()?;
    ///         total += i;
    ///     }
    ///     Ok(total)
    /// }
    ///
    /// let token = CancellationToken::new();
    /// assert!(crunch(&token).is_ok());
    /// token.cancel();
    /// assert!(crunch(&token).is_err());
    /// ```
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            let reason = self
                .reason()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            Err(LineError::cancelled("task", reason))
        } else {
            Ok(())
        }
    }

    /// Sleep for up to `timeout`, waking early on cancellation
    ///
    /// Returns `true` if the token is cancelled when the call returns.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut parked = self.inner.parked.lock();
        while !self.is_cancelled() {
            if self
                .inner
                .wakeup
                .wait_until(&mut parked, deadline)
                .timed_out()
            {
                break;
            }
        }
        self.is_cancelled()
    }

    /// Registers a callback to run on cancellation
    ///
    /// Runs immediately if the token is already cancelled. The returned guard
    /// unregisters the callback when dropped.
    pub fn on_cancel<F>(&self, callback: F) -> CancellationCallbackGuard
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        let id = next_callback_id();

        let mut callbacks = self.inner.callbacks.lock();
        if self.is_cancelled() {
            drop(callbacks);
            callback();
        } else {
            callbacks.push(StoredCallback {
                id,
                callback: Box::new(callback),
            });
        }

        CancellationCallbackGuard {
            token: Some(self.clone()),
            callback_id: id,
        }
    }

    /// Registers a callback that stays registered for the token's lifetime
    pub fn on_cancel_always<F>(&self, callback: F)
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.on_cancel(callback).detach();
    }

    fn remove_callback(&self, callback_id: usize) {
        self.inner.callbacks.lock().retain(|c| c.id != callback_id);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Unregisters a cancellation callback when dropped
pub struct CancellationCallbackGuard {
    token: Option<CancellationToken>,
    callback_id: usize,
}

impl Drop for CancellationCallbackGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            if !token.is_cancelled() {
                token.remove_callback(self.callback_id);
            }
        }
    }
}

impl CancellationCallbackGuard {
    /// Keep the callback registered after the guard is gone
    pub fn detach(mut self) {
        self.token = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        token.cancel_with_reason(CancellationReason::LineTerminated);
        token.cancel();

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some(CancellationReason::LineTerminated));
    }

    #[test]
    fn test_clone_shares_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_child_follows_parent() {
        let grandparent = CancellationToken::new();
        let parent = grandparent.child();
        let child = parent.child();

        grandparent.cancel();

        assert!(parent.is_cancelled());
        assert!(child.is_cancelled());
        assert_eq!(child.reason(), Some(CancellationReason::ParentCancelled));
    }

    #[test]
    fn test_child_cancel_leaves_parent_alone() {
        let parent = CancellationToken::new();
        let sibling = parent.child();
        let child = parent.child();

        child.cancel();

        assert!(!parent.is_cancelled());
        assert!(!sibling.is_cancelled());
    }

    #[test]
    fn test_child_of_cancelled_parent() {
        let parent = CancellationToken::new();
        parent.cancel();

        let child = parent.child();
        assert!(child.is_cancelled());
        assert_eq!(child.reason(), Some(CancellationReason::ParentCancelled));
    }

    #[test]
    fn test_dropped_children_are_pruned() {
        let parent = CancellationToken::new();
        for _ in 0..10 {
            let _ = parent.child();
        }
        let _kept = parent.child();
        assert!(parent.inner.children.read().len() <= 2);
    }

    #[test]
    fn test_callback_runs_once() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        token.on_cancel_always(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        token.cancel();
        token.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_on_cancelled_token_runs_immediately() {
        let token = CancellationToken::new();
        token.cancel();

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = Arc::clone(&called);
        let _guard = token.on_cancel(move || called_clone.store(true, Ordering::SeqCst));

        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_dropped_guard_unregisters() {
        let token = CancellationToken::new();
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = Arc::clone(&called);

        {
            let _guard = token.on_cancel(move || called_clone.store(true, Ordering::SeqCst));
        }

        token.cancel();
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_wait_timeout_expires() {
        let token = CancellationToken::new();
        let start = Instant::now();
        assert!(!token.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_wait_timeout_wakes_on_cancel() {
        let token = CancellationToken::new();
        let sleeper = token.clone();

        let handle = thread::spawn(move || sleeper.wait_timeout(Duration::from_secs(30)));

        thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        token.cancel();

        assert!(handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_parent_cancel_wakes_child_sleeper() {
        let parent = CancellationToken::new();
        let child = parent.child();

        let handle = thread::spawn(move || child.wait_timeout(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(50));
        parent.cancel();

        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_with_timeout() {
        let token = CancellationToken::with_timeout(Duration::from_millis(40));
        assert!(!token.is_cancelled());

        thread::sleep(Duration::from_millis(200));
        assert!(token.is_cancelled());
        assert_eq!(
            token.reason(),
            Some(CancellationReason::Timeout(Duration::from_millis(40)))
        );
    }

    #[test]
    fn test_manual_cancel_beats_timeout() {
        let token = CancellationToken::with_timeout(Duration::from_secs(10));
        token.cancel();
        assert_eq!(token.reason(), Some(CancellationReason::Manual));
    }

    #[test]
    fn test_check() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());

        token.cancel();
        let err = token.check().unwrap_err();
        assert!(matches!(err, LineError::Cancelled { .. }));
        assert!(err.to_string().contains("manually cancelled"));
    }
}
