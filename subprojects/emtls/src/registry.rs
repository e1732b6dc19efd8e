//! Process-wide slot assignment.
//!
//! Every emulated thread-local variable is identified by a small positive
//! slot index, assigned on the first access from any thread and never
//! reused. Slot values are dense: after `K` distinct variables have been
//! accessed, exactly `{1..=K}` have been handed out.
//!
//! The assignment implements double-checked locking:
//!
//! 1. uninstrumented fast path — an acquire load of the descriptor's
//!    [`SlotCell`]; non-zero means assigned, return with no lock;
//! 2. locked re-check — another thread may have assigned the slot between
//!    the fast-path load and the lock acquisition;
//! 3. publish — increment the monotonic counter and release-store the new
//!    index into the cell.
//!
//! The release store pairs with the fast path's acquire load, so a thread
//! that observes a non-zero slot also observes everything the assigning
//! thread did before publishing it — in particular the one-time creation of
//! the thread-exit key.

use core::num::NonZeroUsize;
use core::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "threads")]
use core::cell::UnsafeCell;

#[cfg(feature = "threads")]
use emtls_sys_pthread::Mutex;

/// A lazily-assigned monotonic id.
///
/// Zero is the unassigned sentinel. In threaded builds the value is the
/// variable's slot index; the single-threaded fallback reuses the cell to
/// hold the variable's one global instance address instead.
#[repr(transparent)]
pub struct SlotCell(AtomicUsize);

impl SlotCell {
    /// Creates an unassigned cell.
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    /// Returns the assigned id, if any. This is the lock-free fast path.
    #[inline]
    pub fn get(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.0.load(Ordering::Acquire))
    }

    /// Publishes an id. Called exactly once per cell, under the registry
    /// lock.
    #[cfg(feature = "threads")]
    #[inline]
    fn publish(&self, id: NonZeroUsize) {
        self.0.store(id.get(), Ordering::Release);
    }

    /// The single global instance address stored in this cell, if any.
    #[cfg(not(feature = "threads"))]
    #[inline]
    pub(crate) fn instance_ptr(&self) -> Option<core::ptr::NonNull<u8>> {
        core::ptr::NonNull::new(self.0.load(Ordering::Acquire) as *mut u8)
    }

    /// Stores the single global instance address into this cell.
    #[cfg(not(feature = "threads"))]
    #[inline]
    pub(crate) fn set_instance_ptr(&self, ptr: core::ptr::NonNull<u8>) {
        self.0.store(ptr.as_ptr() as usize, Ordering::Release);
    }
}

impl Default for SlotCell {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide slot counter and its lock.
#[cfg(feature = "threads")]
pub struct SlotRegistry {
    lock: Mutex,
    next_slot: UnsafeCell<usize>,
}

// SAFETY: `next_slot` is only read or written with `lock` held.
#[cfg(feature = "threads")]
unsafe impl Sync for SlotRegistry {}

#[cfg(feature = "threads")]
impl SlotRegistry {
    /// Creates a registry with no slots assigned.
    pub const fn new() -> Self {
        Self {
            lock: Mutex::new(),
            next_slot: UnsafeCell::new(0),
        }
    }

    /// Returns the slot assigned to `cell`, assigning the next free index
    /// if this is the first access from any thread.
    pub fn resolve(&self, cell: &SlotCell) -> NonZeroUsize {
        // Fast path: taken on every access after the first.
        if let Some(slot) = cell.get() {
            return slot;
        }

        self.lock.lock();
        let slot = match cell.get() {
            // Another thread won the assignment race.
            Some(slot) => slot,
            None => {
                // SAFETY: `next_slot` is only touched with `lock` held.
                let next = unsafe { &mut *self.next_slot.get() };
                *next += 1;
                let Some(slot) = NonZeroUsize::new(*next) else {
                    // The counter starts at zero and only increments.
                    unreachable!()
                };
                cell.publish(slot);
                slot
            }
        };
        self.lock.unlock();

        slot
    }
}

#[cfg(feature = "threads")]
impl Default for SlotRegistry {
    fn default() -> Self {
        Self::new()
    }
}
