//! Edge-triggered boolean flag built on a closable broadcast channel.
//!
//! [`PulseFlag`] keeps a zero-capacity "epoch" channel next to its value.
//! A false→true transition drops the channel's sender, which disconnects
//! every receiver at once and releases all blocked waiters, then installs a
//! fresh channel for the next cycle. `set(false)` re-arms the flag: waiters
//! arriving after it block until the next transition.
//!
//! Unlike [`Flag`](crate::Flag), the release here is a one-shot pulse per
//! transition. The one level-triggered concession is at wait entry: a wait
//! that starts while the value is already `true` returns immediately
//! instead of stranding until the next transition.

use crossbeam_channel::{at, bounded, never, select, Receiver, Sender};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

use crate::cancel::CancelToken;

/// A thread-safe boolean whose waiters are released by closing and
/// replacing a broadcast channel on each false→true transition.
///
/// Handles are cheap to clone; clones share the same flag. A fresh flag
/// reads `false`.
#[derive(Clone)]
pub struct PulseFlag {
    inner: Arc<Inner>,
}

struct Inner {
    /// Current value. The epoch lock serializes false→true transitions.
    value: AtomicBool,
    epoch: RwLock<Epoch>,
    /// Waiters currently blocked in a wait call.
    waiters: AtomicUsize,
}

/// One broadcast cycle. Dropping `_tx` disconnects every receiver clone,
/// which is the release signal.
struct Epoch {
    _tx: Sender<()>,
    rx: Receiver<()>,
}

impl Epoch {
    fn fresh() -> Self {
        let (tx, rx) = bounded(0);
        Self { _tx: tx, rx }
    }
}

impl PulseFlag {
    /// Creates a new flag reading `false`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                value: AtomicBool::new(false),
                epoch: RwLock::new(Epoch::fresh()),
                waiters: AtomicUsize::new(0),
            }),
        }
    }

    /// Atomically stores `value`.
    ///
    /// A false→true transition closes the current epoch channel (releasing
    /// every blocked waiter) and installs a fresh one. Redundant sets are
    /// lock-free no-ops; `set(false)` re-arms without touching the channel.
    pub fn set(&self, value: bool) {
        if value {
            self.set_true();
        } else {
            self.set_false();
        }
    }

    fn set_true(&self) {
        if self.inner.value.load(Ordering::Acquire) {
            return;
        }
        let mut epoch = self.inner.epoch.write();
        if self.inner.value.load(Ordering::Relaxed) {
            return;
        }
        self.inner.value.store(true, Ordering::Release);
        // Replacing the epoch drops the old sender: the disconnect is the
        // broadcast. Exactly one pulse per logical transition.
        *epoch = Epoch::fresh();
        trace!(target: "waitflag", "pulse flag set true, epoch closed");
    }

    fn set_false(&self) {
        if !self.inner.value.load(Ordering::Acquire) {
            return;
        }
        self.inner.value.store(false, Ordering::Release);
    }

    /// Returns the current value. Lock-free, never blocks.
    #[must_use]
    pub fn value(&self) -> bool {
        self.inner.value.load(Ordering::Acquire)
    }

    /// Blocks until the value becomes `true` and returns the value observed
    /// at release.
    ///
    /// Returns immediately if the value is already `true` at wait entry.
    /// With no cancellation signal this may block indefinitely.
    pub fn wait(&self) -> bool {
        self.block_on_epoch(None)
    }

    /// Blocks until the value becomes `true` or `cancel` fires, returning
    /// the value observed at release (`false` when cancelled while unset).
    pub fn wait_with(&self, cancel: &CancelToken) -> bool {
        self.block_on_epoch(Some(cancel))
    }

    /// Number of callers currently blocked in a wait.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.inner.waiters.load(Ordering::Acquire)
    }

    fn block_on_epoch(&self, cancel: Option<&CancelToken>) -> bool {
        // Snapshot the epoch first: a transition after the snapshot closes
        // this very receiver, and a transition before it is caught by the
        // value check below. Either way no wakeup is lost.
        let epoch_rx = self.inner.epoch.read().rx.clone();
        if self.inner.value.load(Ordering::Acquire) {
            return true;
        }
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return self.value();
        }

        let cancel_rx = cancel.map_or_else(never, CancelToken::closed);
        let deadline_rx = cancel
            .and_then(CancelToken::deadline)
            .map_or_else(never::<Instant>, at);

        self.inner.waiters.fetch_add(1, Ordering::AcqRel);
        trace!(target: "waitflag", "pulse waiter blocked on epoch");
        select! {
            recv(epoch_rx) -> _ => {
                trace!(target: "waitflag", "pulse waiter released, epoch closed");
            }
            recv(cancel_rx) -> _ => {
                trace!(target: "waitflag", "pulse waiter released by cancellation");
            }
            recv(deadline_rx) -> _ => {
                trace!(target: "waitflag", "pulse waiter released by deadline");
            }
        }
        self.inner.waiters.fetch_sub(1, Ordering::AcqRel);

        self.value()
    }
}

impl Default for PulseFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PulseFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulseFlag")
            .field("value", &self.value())
            .field("waiters", &self.waiter_count())
            .finish()
    }
}
