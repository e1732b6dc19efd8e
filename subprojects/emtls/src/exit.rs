//! Thread-exit coordination.
//!
//! A thread's store is released from the platform's thread-specific key
//! destructor. Destructors run in several rounds, and cleanup scheduled in
//! other keys — including destructors for other thread-local objects — may
//! still read emulated TLS during an earlier round. Deallocation therefore
//! defers itself by [`SKIP_DESTRUCTOR_ROUNDS`]: while the countdown is
//! positive the hook decrements it and re-registers the store for the next
//! round; at zero it frees every storage block and then the store itself.

use alloc::boxed::Box;
use core::{cell::UnsafeCell, ffi::c_void, ptr::NonNull};

use emtls_sys_pthread::{self as sys, Key, Once};

use crate::store::ThreadStore;

/// Destructor rounds to sit out before releasing a thread's store.
///
/// Bionic runs multi-phase thread-exit cleanup (C++ thread_local
/// destructors piggyback on key destructors there), so deallocation waits
/// one round; everywhere else the first round is safe.
#[cfg(target_os = "android")]
pub const SKIP_DESTRUCTOR_ROUNDS: usize = 1;
#[cfg(not(target_os = "android"))]
pub const SKIP_DESTRUCTOR_ROUNDS: usize = 0;

/// Owns the thread-specific key that reaches every thread's store.
///
/// The key is created exactly once per coordinator, race-free, through the
/// one-time gate; creation failure aborts the process (there is no
/// fallback below this layer).
pub struct ExitCoordinator {
    init: Once,
    key: UnsafeCell<Key>,
}

// SAFETY: `key` is written once inside the `init` gate and read only after
// the gate's completion is observed (directly, or transitively through an
// acquire load of a published slot index).
unsafe impl Sync for ExitCoordinator {}

impl ExitCoordinator {
    /// Creates a coordinator whose key is not yet created.
    pub const fn new() -> Self {
        Self {
            init: Once::new(),
            key: UnsafeCell::new(Key::from_raw(0)),
        }
    }

    /// Creates the thread-exit key on first call; returns it on every call.
    pub fn ensure_init(&self) -> Key {
        self.init.call_once(|| match Key::create(Some(store_exit_hook)) {
            // SAFETY: first and only write, inside the gate.
            Ok(key) => unsafe { *self.key.get() = key },
            Err(_) => sys::abort(),
        });
        self.key()
    }

    /// Returns the key without running the gate.
    ///
    /// Callers must already have observed the coordinator as initialized:
    /// either [`ExitCoordinator::ensure_init`] returned on this thread, or
    /// a slot index published after initialization was acquire-loaded.
    #[inline]
    pub fn key(&self) -> Key {
        // SAFETY: per the method contract the initializing write
        // happened-before this read, and no write can follow it.
        unsafe { *self.key.get() }
    }

    /// The calling thread's store, if one was installed.
    #[inline]
    pub fn current_store(&self) -> Option<NonNull<ThreadStore>> {
        NonNull::new(self.key().get().cast())
    }

    /// Installs `store` as the calling thread's store and hands back its
    /// address. The store is now owned by the key until thread exit.
    pub fn install_store(&self, store: Box<ThreadStore>) -> NonNull<ThreadStore> {
        let ptr = Box::into_raw(store);
        // SAFETY: `ptr` is a live heap allocation; the exit hook reclaims it.
        if unsafe { self.key().set(ptr.cast()) }.is_err() {
            sys::abort();
        }
        // SAFETY: `Box::into_raw` never returns null.
        unsafe { NonNull::new_unchecked(ptr) }
    }

    /// Deletes the thread-exit key, if it was ever created.
    ///
    /// # Safety
    ///
    /// No thread may touch emulated TLS through this coordinator afterwards,
    /// and any live stores are leaked (their destructors will not run).
    pub unsafe fn teardown(&self) {
        if self.init.is_completed() {
            let _ = unsafe { self.key().delete() };
        }
    }
}

impl Default for ExitCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// The thread-specific key destructor for a thread's store.
///
/// Public so the lifecycle tests can drive rounds directly; production code
/// only ever reaches it through the platform's thread-exit machinery.
///
/// # Safety
///
/// `ptr` must be a store pointer produced by
/// [`ExitCoordinator::install_store`] (or a re-registration by this hook),
/// owned by the calling thread, and not used again after the final round.
pub unsafe extern "C" fn store_exit_hook(ptr: *mut c_void) {
    let store = ptr.cast::<ThreadStore>();

    // SAFETY: the platform hands back exactly the pointer installed for
    // this thread; it stays exclusively ours for the duration of the call.
    if unsafe { (*store).begin_destructor_round() } {
        // Cleanup in other keys may still need this TLS during the current
        // round. Re-register so the platform calls us again next round.
        let key = unsafe { (*store).key() };
        if unsafe { key.set(ptr) }.is_err() {
            sys::abort();
        }
    } else {
        // Final round: the store's Drop frees every block, then the box
        // releases the store itself.
        // SAFETY: `ptr` originated in `Box::into_raw` and ownership ends here.
        drop(unsafe { Box::from_raw(store) });
    }
}
