//! Cancellable single-assignment result handles.
//!
//! A [`PendingResult`] represents a value that will be produced at most once,
//! some time in the future. It settles exactly once, supports cancellation
//! before settlement, and notifies registered completion observers.
//!
//! State machine:
//!
//! ```text
//! pending ──settle(value)──► settled(value)
//!    │
//!    └────cancel()─────────► cancelled
//! ```
//!
//! Terminal states are final. A second `settle` or `cancel` is a silent
//! no-op, never an error, and never overwrites the first outcome. Observers
//! registered before settlement run exactly once, synchronously, on the
//! thread that settles. The creator may attach an `on_cancel` hook that runs
//! on the first successful cancellation.
//!
//! Handles are cheap clones of a shared inner state, so the producer and the
//! consumer can each hold one.

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

type Observer<T> = Box<dyn FnOnce(&T) + Send>;
type CancelHook = Box<dyn FnOnce() + Send>;

enum State<T> {
    Pending,
    Settled(T),
    Cancelled,
}

struct Inner<T> {
    state: State<T>,
    observers: Vec<Observer<T>>,
    on_cancel: Option<CancelHook>,
}

/// A cancellable, single-assignment future-like result handle.
pub struct PendingResult<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for PendingResult<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for PendingResult<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingResult<T> {
    /// Creates a new pending result with no cancel hook.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Pending,
                observers: Vec::new(),
                on_cancel: None,
            })),
        }
    }

    /// Creates a new pending result with a hook invoked on the first
    /// successful cancellation.
    pub fn with_cancel_hook(hook: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Pending,
                observers: Vec::new(),
                on_cancel: Some(Box::new(hook)),
            })),
        }
    }

    /// Returns true once the result has settled or been cancelled.
    pub fn is_done(&self) -> bool {
        !matches!(self.inner.lock().state, State::Pending)
    }

    /// Returns true if the result was cancelled before settlement.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.inner.lock().state, State::Cancelled)
    }

    /// Cancels the result if it has not settled yet.
    ///
    /// Returns true if this call performed the transition. Safe to call from
    /// any thread, any number of times; only the first successful call runs
    /// the cancel hook.
    pub fn cancel(&self) -> bool {
        let hook = {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, State::Pending) {
                return false;
            }
            inner.state = State::Cancelled;
            // Observers never fire for a cancelled result.
            inner.observers.clear();
            inner.on_cancel.take()
        };

        if let Some(hook) = hook {
            hook();
        }
        true
    }
}

impl<T: Clone> PendingResult<T> {
    /// Settles the result with a final value.
    ///
    /// The first call wins and returns true; later calls (including calls
    /// racing with `cancel`) are no-ops returning false. Observers run
    /// synchronously on the calling thread, after the internal lock is
    /// released.
    pub fn settle(&self, value: T) -> bool {
        let observers = {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, State::Pending) {
                return false;
            }
            inner.state = State::Settled(value.clone());
            inner.on_cancel = None;
            mem::take(&mut inner.observers)
        };

        for observer in observers {
            observer(&value);
        }
        true
    }

    /// Returns a copy of the settled value, if any.
    pub fn result(&self) -> Option<T> {
        match &self.inner.lock().state {
            State::Settled(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Registers a completion observer.
    ///
    /// Runs exactly once at settlement time, or immediately (on this thread)
    /// if the result has already settled. Dropped without running if the
    /// result is, or becomes, cancelled.
    pub fn on_complete(&self, observer: impl FnOnce(&T) + Send + 'static) {
        let settled = {
            let mut inner = self.inner.lock();
            match &inner.state {
                State::Pending => {
                    inner.observers.push(Box::new(observer));
                    return;
                }
                State::Settled(value) => Some(value.clone()),
                State::Cancelled => None,
            }
        };

        if let Some(value) = settled {
            observer(&value);
        }
    }
}
