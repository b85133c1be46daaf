//! Level-triggered boolean flag with blocking waits.
//!
//! [`Flag`] pairs an atomic value with a mutex/condvar signal. A waiter
//! unblocks whenever the value is currently `true`, re-checking in a loop,
//! so late arrivals and spurious wakeups are both handled by the same path.
//! This is the recommended variant; see [`PulseFlag`](crate::PulseFlag) for
//! the edge-triggered alternative.
//!
//! The internal lock is held only for O(1) sections and never across a
//! park. Stores to the value happen only while the lock is held, which is
//! what makes the check-then-park sequence race-free.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

use crate::cancel::{CancelToken, CancelWake};

/// A thread-safe boolean that waiters can block on until it becomes `true`.
///
/// Handles are cheap to clone; clones share the same flag. A fresh flag
/// reads `false`.
///
/// # Example
///
/// ```
/// use std::thread;
/// use waitflag::Flag;
///
/// let flag = Flag::new();
/// let waiter = {
///     let flag = flag.clone();
///     thread::spawn(move || flag.wait())
/// };
/// flag.set(true);
/// assert!(waiter.join().unwrap());
/// ```
#[derive(Clone)]
pub struct Flag {
    inner: Arc<Inner>,
}

struct Inner {
    /// Current value. Stored only while `lock` is held; loaded freely.
    value: AtomicBool,
    lock: Mutex<()>,
    cvar: Condvar,
    /// Waiters currently parked (or about to park) in a wait call.
    waiters: AtomicUsize,
}

impl CancelWake for Inner {
    fn wake_cancelled(&self) {
        // Acquire and release the lock before notifying: a waiter is then
        // either before its token re-check (and will observe the cancel) or
        // already parked (and receives the notification).
        drop(self.lock.lock());
        self.cvar.notify_all();
    }
}

impl Flag {
    /// Creates a new flag reading `false`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                value: AtomicBool::new(false),
                lock: Mutex::new(()),
                cvar: Condvar::new(),
                waiters: AtomicUsize::new(0),
            }),
        }
    }

    /// Atomically stores `value`.
    ///
    /// A false→true transition releases every blocked waiter. Redundant
    /// sets take a lock-free fast path and notify nobody. Never blocks the
    /// caller beyond the O(1) critical section.
    pub fn set(&self, value: bool) {
        if self.inner.value.load(Ordering::Acquire) == value {
            return;
        }
        let guard = self.inner.lock.lock();
        if self.inner.value.load(Ordering::Relaxed) == value {
            return;
        }
        self.inner.value.store(value, Ordering::Release);
        drop(guard);
        if value {
            trace!(target: "waitflag", "flag set true, releasing waiters");
            self.inner.cvar.notify_all();
        }
    }

    /// Returns the current value. Lock-free, never blocks.
    #[must_use]
    pub fn value(&self) -> bool {
        self.inner.value.load(Ordering::Acquire)
    }

    /// Blocks until the value is observed `true` and returns it.
    ///
    /// Returns immediately if the value is already `true`. With no
    /// cancellation signal this may block indefinitely.
    pub fn wait(&self) -> bool {
        self.block_until_true(None)
    }

    /// Blocks until the value is observed `true` or `cancel` fires.
    ///
    /// Returns the value observed at the moment of release: `true` when the
    /// flag was set, `false` when cancellation fired while it was still
    /// unset. If both race, either return value may be observed, but the
    /// call returns promptly.
    pub fn wait_with(&self, cancel: &CancelToken) -> bool {
        self.block_until_true(Some(cancel))
    }

    /// Number of callers currently blocked in a wait.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.inner.waiters.load(Ordering::Acquire)
    }

    fn block_until_true(&self, cancel: Option<&CancelToken>) -> bool {
        let inner = &self.inner;
        if inner.value.load(Ordering::Acquire) {
            return true;
        }

        // Register the wake hook before the locked re-check so a cancel()
        // racing with wait entry is never missed.
        let _registration = cancel.map(|token| {
            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            token.register(weak)
        });

        inner.waiters.fetch_add(1, Ordering::AcqRel);
        let _count = CountGuard(&inner.waiters);
        trace!(target: "waitflag", "waiter parked");

        let mut guard = inner.lock.lock();
        loop {
            if inner.value.load(Ordering::Acquire) {
                trace!(target: "waitflag", "waiter released, value true");
                return true;
            }
            match cancel {
                Some(token) if token.is_cancelled() => {
                    trace!(target: "waitflag", "waiter released by cancellation");
                    return false;
                }
                Some(token) => match token.deadline() {
                    Some(deadline) => {
                        let _ = inner.cvar.wait_until(&mut guard, deadline);
                    }
                    None => inner.cvar.wait(&mut guard),
                },
                None => inner.cvar.wait(&mut guard),
            }
        }
    }
}

impl Default for Flag {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flag")
            .field("value", &self.value())
            .field("waiters", &self.waiter_count())
            .finish()
    }
}

/// Decrements the waiter counter on every exit path from a wait.
struct CountGuard<'a>(&'a AtomicUsize);

impl Drop for CountGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
