//! Storage block allocation with arbitrary alignment.
//!
//! ## Design highlights
//!
//! 1. **Placement record** — the raw heap pointer and the aligned user
//!    pointer are computed together, once, in [`placement`]. Everything else
//!    works with the resulting pair instead of repeating address masking.
//! 2. **Hidden back-pointer** — the raw pointer is stored in the
//!    pointer-width cell immediately preceding the user region, for both the
//!    small-alignment and over-aligned layouts. [`Block::free`] reads that
//!    one cell and releases the raw allocation.
//! 3. **Template initialization** — the user region is copied from the
//!    variable's initializer blob when one exists, zero-filled otherwise.

use core::{
    ffi::c_void,
    ptr::{self, NonNull},
};

use crate::stats;

/// Width of the hidden back-pointer cell.
const PTR_WIDTH: usize = size_of::<*mut c_void>();

/// Raw and user address pair for one allocation.
struct Placement {
    raw: *mut c_void,
    user: *mut u8,
}

/// Computes where the user region starts inside the raw allocation.
///
/// For `align <= PTR_WIDTH` the user region sits directly after the
/// back-pointer cell. Otherwise it is the lowest `align`-aligned address at
/// or after `raw + PTR_WIDTH`, which always leaves at least one pointer-width
/// cell before it for the back-pointer.
fn placement(raw: *mut c_void, align: usize) -> Placement {
    let user = if align <= PTR_WIDTH {
        // SAFETY: the allocation is at least `PTR_WIDTH` bytes larger than
        // the user region (see `Block::allocate`).
        unsafe { raw.cast::<u8>().add(PTR_WIDTH) }
    } else {
        ((raw as usize + PTR_WIDTH + align - 1) & !(align - 1)) as *mut u8
    };
    Placement { raw, user }
}

/// Handle to one aligned storage block.
///
/// The handle owns the block; releasing it goes through [`Block::free`].
/// There is no `Drop` impl on purpose — blocks are parked as raw pointers in
/// per-thread slot arrays and reconstituted at thread exit.
#[derive(Debug)]
pub struct Block {
    user: NonNull<u8>,
}

impl Block {
    /// Allocates a block of `size` bytes aligned to `align`, initialized by
    /// copying `templ` when non-null and zero-filled otherwise.
    ///
    /// Aborts the process if the platform heap is exhausted.
    ///
    /// # Safety
    ///
    /// - `align` must be a power of two.
    /// - `templ`, when non-null, must be readable for `size` bytes.
    pub unsafe fn allocate(size: usize, align: usize, templ: *const u8) -> Self {
        let request = if align <= PTR_WIDTH {
            size + PTR_WIDTH
        } else {
            size + PTR_WIDTH + align - 1
        };

        // SAFETY: `request` accounts for the back-pointer cell and worst-case
        // alignment padding.
        let raw = unsafe { libc::malloc(request) };
        if raw.is_null() {
            // No recovery path exists at this layer.
            unsafe { libc::abort() }
        }

        let Placement { raw, user } = placement(raw, align);

        // SAFETY: `user` is `>= raw + PTR_WIDTH` and pointer-aligned (malloc
        // alignment in the small case, a multiple of `align > PTR_WIDTH`
        // otherwise), so the preceding cell is in-bounds and well aligned.
        unsafe { user.cast::<*mut c_void>().sub(1).write(raw) };

        // SAFETY: `user..user + size` lies inside the allocation; the caller
        // guarantees `templ` covers `size` bytes when non-null.
        unsafe {
            if templ.is_null() {
                ptr::write_bytes(user, 0, size);
            } else {
                ptr::copy_nonoverlapping(templ, user, size);
            }
        }

        stats::note_block_allocated();

        // SAFETY: `user` is derived from a successful allocation.
        Self {
            user: unsafe { NonNull::new_unchecked(user) },
        }
    }

    /// Returns the block's user address.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.user.as_ptr()
    }

    /// Consumes the handle, leaving the block parked behind a raw pointer.
    #[inline]
    pub fn into_raw(self) -> NonNull<u8> {
        self.user
    }

    /// Reconstitutes a handle from a pointer produced by [`Block::into_raw`].
    ///
    /// # Safety
    ///
    /// `user` must come from [`Block::into_raw`] and must not be
    /// reconstituted more than once.
    #[inline]
    pub unsafe fn from_raw(user: NonNull<u8>) -> Self {
        Self { user }
    }

    /// Releases the block.
    ///
    /// # Safety
    ///
    /// The block must not be accessed afterwards through any surviving copy
    /// of its address.
    pub unsafe fn free(self) {
        // SAFETY: `allocate` stored the raw allocation pointer in the cell
        // immediately preceding the user region.
        let raw = unsafe { self.user.as_ptr().cast::<*mut c_void>().sub(1).read() };
        // SAFETY: `raw` came from `libc::malloc` and is released exactly once.
        unsafe { libc::free(raw) };
        stats::note_block_released();
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use core::ptr;
    use std::{sync::Mutex, vec::Vec};

    use super::Block;
    use crate::stats;

    // Serializes the tests that assert on the process-wide counters.
    static STATS_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn honors_every_alignment() {
        let _guard = STATS_LOCK.lock().unwrap();
        for align in [1usize, 2, 4, 8, 16, 32, 64] {
            let block = unsafe { Block::allocate(24, align, ptr::null()) };
            assert_eq!(
                block.as_ptr() as usize % align,
                0,
                "misaligned block for align {align}"
            );
            unsafe { block.free() };
        }
    }

    #[test]
    fn zero_fills_without_template() {
        let _guard = STATS_LOCK.lock().unwrap();
        let block = unsafe { Block::allocate(64, 16, ptr::null()) };
        let bytes = unsafe { core::slice::from_raw_parts(block.as_ptr(), 64) };
        assert!(bytes.iter().all(|&b| b == 0));
        unsafe { block.free() };
    }

    #[test]
    fn copies_template() {
        let _guard = STATS_LOCK.lock().unwrap();
        let templ: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];
        let block = unsafe { Block::allocate(templ.len(), 32, templ.as_ptr()) };
        let bytes = unsafe { core::slice::from_raw_parts(block.as_ptr(), templ.len()) };
        assert_eq!(bytes, &templ);
        unsafe { block.free() };
    }

    #[test]
    fn park_and_reconstitute() {
        let _guard = STATS_LOCK.lock().unwrap();
        let block = unsafe { Block::allocate(16, 64, ptr::null()) };
        let parked = block.into_raw();
        let block = unsafe { Block::from_raw(parked) };
        assert_eq!(block.as_ptr(), parked.as_ptr());
        unsafe { block.free() };
    }

    #[test]
    fn counters_balance() {
        let _guard = STATS_LOCK.lock().unwrap();
        let allocated_before = stats::allocated();
        let released_before = stats::released();

        let blocks: Vec<Block> = (0..5)
            .map(|_| unsafe { Block::allocate(8, 8, ptr::null()) })
            .collect();
        assert_eq!(stats::allocated() - allocated_before, 5);
        assert_eq!(stats::released() - released_before, 0);

        for block in blocks {
            unsafe { block.free() };
        }
        assert_eq!(stats::released() - released_before, 5);
    }
}
