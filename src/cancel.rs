//! Cancellation tokens for abandoning a blocked wait.
//!
//! A [`CancelToken`] is the externally supplied signal accepted by
//! [`Flag::wait_with`](crate::Flag::wait_with) and
//! [`PulseFlag::wait_with`](crate::PulseFlag::wait_with). It fires either
//! through an explicit [`cancel`](CancelToken::cancel) call or by reaching a
//! deadline, and it wakes blocked waiters through two mechanisms:
//!
//! - a zero-capacity channel whose sender is dropped on cancel, so
//!   channel-based waits can `select!` on the disconnect;
//! - a registry of wake hooks, so condvar-based waits parked at the time of
//!   the cancel are notified.
//!
//! Cancellation is cooperative: the token never interrupts a thread, it only
//! releases waits that opted in.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::trace;

/// Wake hook installed by primitives whose waiters park on a condition
/// variable. `cancel()` invokes every live hook after setting the trigger.
pub(crate) trait CancelWake: Send + Sync {
    /// Wake all waiters parked on this target so they re-check the token.
    fn wake_cancelled(&self);
}

struct Registry {
    next_id: u64,
    hooks: Vec<(u64, Weak<dyn CancelWake>)>,
}

struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    /// Dropped on cancel; receiver clones observe the disconnect.
    sender: Mutex<Option<Sender<()>>>,
    closed: Receiver<()>,
    registry: Mutex<Registry>,
}

/// A clonable, shareable cancellation signal for blocked waits.
///
/// Clones share one trigger: cancelling any clone cancels them all. A token
/// constructed with a deadline reports itself cancelled once the deadline
/// passes, without any timer thread; deadline wakeups are driven by the
/// waiting primitive itself.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// Creates a token that fires only on an explicit [`cancel`](Self::cancel).
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates a token that fires at `deadline` (or earlier via `cancel`).
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline))
    }

    /// Creates a token that fires after `timeout` (or earlier via `cancel`).
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Some(Instant::now() + timeout))
    }

    fn build(deadline: Option<Instant>) -> Self {
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline,
                sender: Mutex::new(Some(tx)),
                closed: rx,
                registry: Mutex::new(Registry {
                    next_id: 0,
                    hooks: Vec::new(),
                }),
            }),
        }
    }

    /// Fires the trigger, releasing every wait blocked on this token.
    ///
    /// Idempotent: later calls are no-ops.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        trace!(target: "waitflag", "cancel token fired");

        // Close the channel side: select-based waits see the disconnect.
        drop(self.inner.sender.lock().take());

        // Collect live hooks under the lock, wake after releasing it.
        let hooks: SmallVec<[Arc<dyn CancelWake>; 4]> = {
            let mut registry = self.inner.registry.lock();
            registry
                .hooks
                .drain(..)
                .filter_map(|(_, weak)| weak.upgrade())
                .collect()
        };
        for hook in hooks {
            hook.wake_cancelled();
        }
    }

    /// Returns `true` once the trigger has fired or the deadline has passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return true;
        }
        self.inner
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Returns the deadline, if this token carries one.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Receiver that becomes disconnected when the trigger fires.
    pub(crate) fn closed(&self) -> Receiver<()> {
        self.inner.closed.clone()
    }

    /// Registers a wake hook for the lifetime of the returned guard.
    pub(crate) fn register(&self, hook: Weak<dyn CancelWake>) -> Registration {
        let id = {
            let mut registry = self.inner.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.hooks.push((id, hook));
            id
        };
        Registration {
            token: self.clone(),
            id,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.inner.cancelled.load(Ordering::Relaxed))
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}

/// Guard returned by [`CancelToken::register`]; removes the hook on drop.
pub(crate) struct Registration {
    token: CancelToken,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut registry = self.token.inner.registry.lock();
        if let Some(pos) = registry.hooks.iter().position(|(id, _)| *id == self.id) {
            registry.hooks.swap_remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingHook(AtomicUsize);

    impl CancelWake for CountingHook {
        fn wake_cancelled(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.deadline().is_none());
    }

    #[test]
    fn cancel_is_sticky_and_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn clones_share_the_trigger() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn past_deadline_reports_cancelled() {
        let token = CancelToken::with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(token.is_cancelled());
    }

    #[test]
    fn future_deadline_not_yet_cancelled() {
        let token = CancelToken::with_timeout(Duration::from_secs(60));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_closes_the_channel_side() {
        let token = CancelToken::new();
        let closed = token.closed();
        token.cancel();
        // Disconnected channel: recv returns Err immediately.
        assert!(closed.recv().is_err());
    }

    #[test]
    fn cancel_wakes_registered_hooks_once() {
        let token = CancelToken::new();
        let hook = Arc::new(CountingHook(AtomicUsize::new(0)));
        let weak: Weak<CountingHook> = Arc::downgrade(&hook);
        let _registration = token.register(weak);

        token.cancel();
        token.cancel();
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_registration_is_not_woken() {
        let token = CancelToken::new();
        let hook = Arc::new(CountingHook(AtomicUsize::new(0)));
        let weak: Weak<CountingHook> = Arc::downgrade(&hook);
        drop(token.register(weak));

        token.cancel();
        assert_eq!(hook.0.load(Ordering::SeqCst), 0);
    }
}
