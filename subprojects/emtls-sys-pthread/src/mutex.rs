//! # Mutex
//!
//! A mutual-exclusion primitive over `pthread_mutex_t`.
//!
//! The wrapper is deliberately minimal: it is statically initializable (so it
//! can live in a `static` without any runtime setup call) and exposes only
//! `lock`/`unlock`. Lock failures on a default, statically initialized POSIX
//! mutex indicate a corrupted process image; they are checked in debug builds
//! and ignored in release builds, matching the behaviour of the C runtime
//! this crate stands in for.

use core::cell::UnsafeCell;

/// A non-recursive mutual exclusion primitive.
///
/// May be placed in static storage and shared freely between threads.
pub struct Mutex {
    inner: UnsafeCell<libc::pthread_mutex_t>,
}

impl Mutex {
    /// Creates a new unlocked mutex.
    #[inline]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER),
        }
    }

    /// Acquires the mutex, blocking until it is available.
    #[inline]
    pub fn lock(&self) {
        // SAFETY: `inner` is a valid, initialized pthread mutex for the
        // lifetime of `self`; locking from any thread is permitted.
        let rc = unsafe { libc::pthread_mutex_lock(self.inner.get()) };
        debug_assert_eq!(rc, 0);
    }

    /// Releases the mutex.
    ///
    /// Must only be called by the thread that currently holds the lock.
    #[inline]
    pub fn unlock(&self) {
        // SAFETY: see `lock`; the caller holds the mutex.
        let rc = unsafe { libc::pthread_mutex_unlock(self.inner.get()) };
        debug_assert_eq!(rc, 0);
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the underlying pthread mutex is designed for cross-thread use; all
// interior mutability goes through the pthread calls.
unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::{sync::Arc, thread, vec::Vec};

    use super::Mutex;

    #[test]
    fn lock_unlock_roundtrip() {
        let mutex = Mutex::new();
        mutex.lock();
        mutex.unlock();
    }

    #[test]
    fn provides_mutual_exclusion() {
        struct Shared {
            mutex: Mutex,
            counter: core::cell::UnsafeCell<u64>,
        }
        // SAFETY: `counter` is only touched with `mutex` held.
        unsafe impl Sync for Shared {}

        let shared = Arc::new(Shared {
            mutex: Mutex::new(),
            counter: core::cell::UnsafeCell::new(0),
        });

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        shared.mutex.lock();
                        unsafe { *shared.counter.get() += 1 };
                        shared.mutex.unlock();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        shared.mutex.lock();
        let total = unsafe { *shared.counter.get() };
        shared.mutex.unlock();
        assert_eq!(total, 8_000);
    }
}
