//! Timeout-guarded request tracking.
//!
//! [`DeadlineTracker`] races an asynchronous completion against a deadline
//! timer and guarantees the caller's callback fires exactly once, with
//! either the real result or the synthetic [`Expired`] failure, never both
//! and never zero times, regardless of which event wins.
//!
//! ```text
//! guard(deadline, callback)
//!   ├── records a live token in the tracking table
//!   ├── starts a deadline timer
//!   └── returns a Completion handle wrapping the success path
//!
//! Completion::complete(value)        timer fires
//!   token live?                        token live?
//!     yes: cancel timer, clear           yes: clear token,
//!          token, callback(Ok)                callback(Err(Expired))
//!     no:  discard late result           no:  no-op, completion won
//! ```
//!
//! The token check makes a completion that straggles in after the logical
//! deadline a guaranteed no-op rather than a double invoke.
//!
//! # Single-Threaded Design
//!
//! Uses `Cell` and `RefCell` for interior mutability; timers are spawned on
//! the current thread's [`tokio::task::LocalSet`]. Compatible with tokio's
//! `current_thread` runtime.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use thiserror::Error;

/// Synthetic failure delivered when the deadline fires before completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation did not complete before its deadline")]
pub struct Expired;

/// Result delivered to a guarded callback.
pub type GuardResult<T> = Result<T, Expired>;

struct InFlight<T> {
    callback: Box<dyn FnOnce(GuardResult<T>)>,
    timer: Option<tokio::task::JoinHandle<()>>,
}

/// Tracker racing asynchronous completions against deadline timers.
///
/// Each guarded operation gets a token unique for the tracker's lifetime.
/// A token is live while its entry sits in the tracking table; both the
/// completion path and the timer path consume the entry, and whichever
/// arrives second finds the table empty and backs off.
pub struct DeadlineTracker<T> {
    next_token: Cell<u64>,
    inflight: RefCell<HashMap<u64, InFlight<T>>>,
}

impl<T: 'static> DeadlineTracker<T> {
    /// Create a new tracker with no in-flight operations.
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            next_token: Cell::new(0),
            inflight: RefCell::new(HashMap::new()),
        })
    }

    /// Guard an asynchronous operation with a deadline.
    ///
    /// Returns the [`Completion`] handle the operation's success path must
    /// invoke. A zero deadline counts as already expired: the callback runs
    /// immediately with `Err(Expired)` and the returned handle is
    /// permanently dead, so the success path never fires.
    ///
    /// Must run inside a [`tokio::task::LocalSet`]; the deadline timer is
    /// spawned on the local task set.
    pub fn guard<F>(self: &Rc<Self>, deadline: Duration, callback: F) -> Completion<T>
    where
        F: FnOnce(GuardResult<T>) + 'static,
    {
        if deadline.is_zero() {
            callback(Err(Expired));
            return Completion {
                tracker: Weak::new(),
                token: 0,
            };
        }

        let token = self.next_token.get();
        self.next_token.set(token + 1);

        self.inflight.borrow_mut().insert(
            token,
            InFlight {
                callback: Box::new(callback),
                timer: None,
            },
        );

        let tracker = Rc::downgrade(self);
        let timer = tokio::task::spawn_local(async move {
            tokio::time::sleep(deadline).await;
            if let Some(tracker) = tracker.upgrade() {
                tracker.expire(token);
            }
        });

        if let Some(entry) = self.inflight.borrow_mut().get_mut(&token) {
            entry.timer = Some(timer);
        }

        Completion {
            tracker: Rc::downgrade(self),
            token,
        }
    }

    /// Number of operations still awaiting completion or expiry.
    pub fn pending(&self) -> usize {
        self.inflight.borrow().len()
    }

    fn expire(&self, token: u64) {
        // Completion won the race if the entry is already gone.
        let Some(entry) = self.inflight.borrow_mut().remove(&token) else {
            return;
        };
        tracing::debug!(token, "deadline fired before completion");
        (entry.callback)(Err(Expired));
    }
}

/// Handle for delivering a guarded operation's real result.
///
/// Consuming the handle enforces at-most-one completion per attempt at the
/// type level; the token check enforces it across the race with the timer.
pub struct Completion<T> {
    tracker: Weak<DeadlineTracker<T>>,
    token: u64,
}

impl<T: 'static> Completion<T> {
    /// Deliver the operation's result.
    ///
    /// If the deadline already fired (or the tracker is gone), the result
    /// is discarded and the callback is not invoked again.
    pub fn complete(self, value: T) {
        let Some(tracker) = self.tracker.upgrade() else {
            return;
        };
        let Some(entry) = tracker.inflight.borrow_mut().remove(&self.token) else {
            tracing::debug!(token = self.token, "discarding completion after deadline");
            return;
        };
        if let Some(timer) = entry.timer {
            timer.abort();
        }
        (entry.callback)(Ok(value));
    }

    /// Whether this attempt is still awaiting its result.
    pub fn is_live(&self) -> bool {
        self.tracker
            .upgrade()
            .map(|tracker| tracker.inflight.borrow().contains_key(&self.token))
            .unwrap_or(false)
    }
}
