//! # Once
//!
//! A one-time execution gate used for process-wide initialization.
//!
//! Unlike `pthread_once` this gate may live anywhere (POSIX leaves
//! `pthread_once_t` outside static storage undefined), and unlike the
//! standard library version it is **non-poisoning**: the runtime it serves
//! aborts the process on initialization failure, so there is no error state
//! to record.
//!
//! The initializer runs while the internal mutex is held. That keeps the
//! implementation to a single atomic plus a mutex — acceptable here because
//! every initializer in this stack is a short, non-reentrant platform call
//! (key creation), never user code.
//!
//! ## Memory ordering
//!
//! The `COMPLETE` store uses `Release` semantics and the fast-path load uses
//! `Acquire`, so every write performed by the initializer is visible to any
//! thread that observes the gate as completed.

use core::sync::atomic::{
    AtomicU32,
    Ordering::{Acquire, Relaxed, Release},
};

use crate::mutex::Mutex;

/// No initialization has run yet.
const INCOMPLETE: u32 = 0;
/// Initialization has completed; all future calls return immediately.
const COMPLETE: u32 = 1;

/// A one-time execution gate.
///
/// May be placed in static storage and used from multiple threads
/// concurrently.
pub struct Once {
    state: AtomicU32,
    lock: Mutex,
}

impl Once {
    /// Creates a new gate in the incomplete state.
    #[inline]
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(INCOMPLETE),
            lock: Mutex::new(),
        }
    }

    /// Returns `true` if the initialization has already run to completion.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.state.load(Acquire) == COMPLETE
    }

    /// Executes the given closure exactly once.
    ///
    /// Callers that lose the race block on the internal mutex until the
    /// winning thread's initializer has finished, then return without
    /// running `f`.
    #[inline]
    pub fn call_once<F>(&self, f: F)
    where
        F: FnOnce(),
    {
        // Fast path: already initialized.
        if self.is_completed() {
            return;
        }

        self.lock.lock();
        // Re-check under the lock: another thread may have won the race
        // between our fast-path load and the lock acquisition.
        if self.state.load(Relaxed) != COMPLETE {
            f();
            self.state.store(COMPLETE, Release);
        }
        self.lock.unlock();
    }
}

impl Default for Once {
    fn default() -> Self {
        Self::new()
    }
}
