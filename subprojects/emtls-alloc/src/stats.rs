//! Process-wide block accounting.
//!
//! Two monotonic counters track how many storage blocks were ever allocated
//! and released. They exist for the thread-exit lifecycle tests (every block
//! released exactly once, and only after the configured number of destructor
//! rounds); production code never reads them.
//!
//! Relaxed ordering is sufficient: the counters carry no synchronization
//! duties, they are only ever compared after the threads under test have
//! been joined.

use core::sync::atomic::{AtomicUsize, Ordering};

static ALLOCATED: AtomicUsize = AtomicUsize::new(0);
static RELEASED: AtomicUsize = AtomicUsize::new(0);

#[inline]
pub(crate) fn note_block_allocated() {
    ALLOCATED.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn note_block_released() {
    RELEASED.fetch_add(1, Ordering::Relaxed);
}

/// Total number of blocks ever allocated by this process.
#[inline]
pub fn allocated() -> usize {
    ALLOCATED.load(Ordering::Relaxed)
}

/// Total number of blocks ever released by this process.
#[inline]
pub fn released() -> usize {
    RELEASED.load(Ordering::Relaxed)
}
