//! The per-thread slot store.
//!
//! One store exists per thread (created lazily on that thread's first TLS
//! access) and maps slot index to storage block. It is reached through the
//! platform thread-specific key and is owned exclusively by its thread: no
//! other thread is ever handed a reference to it, so none of its state is
//! synchronized.
//!
//! ## Design highlights
//!
//! 1. **Header + entry block** — the store is a small header (key, pending
//!    destructor rounds) plus a separately owned growable array of slot
//!    entries, instead of one variable-length allocation.
//! 2. **Growth never moves blocks** — growing reallocates the entry array
//!    only; the storage blocks it points to stay put, so addresses already
//!    handed out remain valid.
//! 3. **Slack** — the array is sized `slot + 32` on creation and growth, to
//!    amortize repeated growth as more variables are accessed.

use alloc::{boxed::Box, vec::Vec};
use core::{mem, num::NonZeroUsize, ptr, ptr::NonNull};

use emtls_alloc::Block;
use emtls_sys_pthread::Key;

use crate::object::EmutlsObject;

/// Extra entries appended beyond the requested slot on creation and growth.
pub const SLOT_SLACK: usize = 32;

/// One thread's slot-indexed storage array.
///
/// Entries are null (no instance created yet) or the stable address of this
/// thread's storage block for that slot. Intentionally neither `Send` nor
/// `Sync`: the raw entries are meaningful only on the owning thread.
pub struct ThreadStore {
    key: Key,
    pending_destructor_rounds: usize,
    slots: Vec<*mut u8>,
}

impl ThreadStore {
    /// Creates a store able to hold `slot`, with the per-target default
    /// number of deferred destructor rounds.
    pub fn new(key: Key, slot: usize) -> Box<Self> {
        Self::with_destructor_rounds(key, slot, crate::exit::SKIP_DESTRUCTOR_ROUNDS)
    }

    /// Creates a store able to hold `slot`, deferring teardown by `rounds`
    /// destructor rounds.
    pub fn with_destructor_rounds(key: Key, slot: usize, rounds: usize) -> Box<Self> {
        let mut slots = Vec::new();
        slots.resize(slot + SLOT_SLACK, ptr::null_mut());
        Box::new(Self {
            key,
            pending_destructor_rounds: rounds,
            slots,
        })
    }

    /// The thread-specific key this store is registered under.
    #[inline]
    pub fn key(&self) -> Key {
        self.key
    }

    /// Number of slots currently allocatable without growth.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Destructor rounds still to be skipped before teardown.
    #[inline]
    pub fn pending_destructor_rounds(&self) -> usize {
        self.pending_destructor_rounds
    }

    /// Consumes one destructor round. Returns `true` while teardown is
    /// still deferred.
    pub(crate) fn begin_destructor_round(&mut self) -> bool {
        if self.pending_destructor_rounds > 0 {
            self.pending_destructor_rounds -= 1;
            true
        } else {
            false
        }
    }

    /// Grows the entry array so that `slot` is in range.
    ///
    /// Existing entries are preserved unchanged and the new suffix is
    /// null-filled. Addresses previously returned for any slot are not
    /// disturbed: only the index array is reallocated.
    pub fn ensure_capacity(&mut self, slot: usize) {
        if slot <= self.slots.len() {
            return;
        }
        let mut new_capacity = self.slots.len() * 2;
        if slot > new_capacity {
            new_capacity = slot + SLOT_SLACK;
        }
        self.slots.resize(new_capacity, ptr::null_mut());
    }

    /// Returns this thread's storage block for `slot`, creating it from the
    /// descriptor's current size, alignment, and template on first access.
    pub fn get_or_create(&mut self, slot: NonZeroUsize, obj: &EmutlsObject) -> NonNull<u8> {
        self.ensure_capacity(slot.get());

        let entry = &mut self.slots[slot.get() - 1];
        if entry.is_null() {
            // A block created now reflects the final merged layout in
            // well-formed usage (registrations precede all accesses). A
            // later enlarging registration never resizes existing blocks.
            // SAFETY: the descriptor's template contract covers `size()`
            // readable bytes.
            let block = unsafe { Block::allocate(obj.size(), obj.align(), obj.template()) };
            *entry = block.into_raw().as_ptr();
        }

        // SAFETY: the entry was just verified (or made) non-null.
        unsafe { NonNull::new_unchecked(*entry) }
    }
}

impl Drop for ThreadStore {
    fn drop(&mut self) {
        for entry in &mut self.slots {
            if let Some(user) = NonNull::new(mem::replace(entry, ptr::null_mut())) {
                // SAFETY: every non-null entry was parked by `get_or_create`
                // and is released exactly once here.
                unsafe { Block::from_raw(user).free() };
            }
        }
    }
}
