//! The ABI descriptor for one emulated thread-local variable.
//!
//! Generated code emits one static descriptor per variable and passes its
//! address to the runtime on every registration and every access. The
//! struct layout is therefore part of the ABI: exactly four machine words,
//! in the order `{ size, align, loc, templ }`, pinned by compile-time
//! assertions below.
//!
//! The fields are atomics so that the lock-free access fast path is defined
//! behaviour in Rust; apart from the slot cell they are read and written
//! with relaxed ordering, because registrations for one variable are
//! serialized by the program loader in well-formed usage (one call per
//! translation unit, all before any access). Concurrent registration of the
//! same descriptor is a precondition violation, not a supported case.

use core::{
    ptr,
    sync::atomic::{AtomicPtr, AtomicUsize, Ordering},
};

use static_assertions::const_assert_eq;

use crate::registry::SlotCell;

/// Descriptor for one emulated thread-local variable.
///
/// `loc` starts at zero (unassigned) and is written exactly once: with the
/// variable's process-wide slot index in threaded builds, or with the single
/// global instance address in the single-threaded fallback.
#[repr(C)]
pub struct EmutlsObject {
    size: AtomicUsize,
    align: AtomicUsize,
    loc: SlotCell,
    templ: AtomicPtr<u8>,
}

// The descriptor layout is consumed by generated code; keep it at exactly
// four machine words.
const_assert_eq!(size_of::<EmutlsObject>(), 4 * size_of::<usize>());
const_assert_eq!(align_of::<EmutlsObject>(), align_of::<usize>());

impl EmutlsObject {
    /// Creates a zero-filled descriptor of `size` bytes aligned to `align`.
    pub const fn new(size: usize, align: usize) -> Self {
        Self {
            size: AtomicUsize::new(size),
            align: AtomicUsize::new(align),
            loc: SlotCell::new(),
            templ: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Creates a descriptor whose instances are initialized from `templ`.
    ///
    /// # Safety
    ///
    /// `templ` must point to at least `size` readable bytes and remain valid
    /// for as long as any thread may first-access this variable.
    pub const unsafe fn with_template(size: usize, align: usize, templ: *mut u8) -> Self {
        Self {
            size: AtomicUsize::new(size),
            align: AtomicUsize::new(align),
            loc: SlotCell::new(),
            templ: AtomicPtr::new(templ),
        }
    }

    /// Merges a registration into this descriptor.
    ///
    /// Size and alignment take the maximum ever seen. The template is
    /// accepted only when its registration size equals the merged size;
    /// observing a larger size discards any previously accepted template,
    /// because it described a layout that is now too small.
    ///
    /// Idempotent and order-independent across the registration calls of
    /// one logical variable (one per translation unit defining it).
    ///
    /// # Safety
    ///
    /// - `templ`, when non-null, must point to at least `size` readable
    ///   bytes and remain valid for as long as any thread may first-access
    ///   this variable.
    /// - Registrations of one descriptor must not race with each other or
    ///   with accesses; the loader serializes them in well-formed programs.
    pub unsafe fn register(&self, size: usize, align: usize, templ: *const u8) {
        if self.size.load(Ordering::Relaxed) < size {
            self.size.store(size, Ordering::Relaxed);
            // Any previously accepted template described the smaller layout.
            self.templ.store(ptr::null_mut(), Ordering::Relaxed);
        }
        if self.align.load(Ordering::Relaxed) < align {
            self.align.store(align, Ordering::Relaxed);
        }
        if !templ.is_null() && size == self.size.load(Ordering::Relaxed) {
            self.templ.store(templ.cast_mut(), Ordering::Relaxed);
        }
    }

    /// Current merged size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Current merged alignment in bytes.
    #[inline]
    pub fn align(&self) -> usize {
        self.align.load(Ordering::Relaxed)
    }

    /// Current initializer template, or null for zero-fill.
    #[inline]
    pub fn template(&self) -> *const u8 {
        self.templ.load(Ordering::Relaxed)
    }

    /// The slot index assigned to this variable, if any thread has accessed
    /// it yet.
    #[cfg(feature = "threads")]
    #[inline]
    pub fn slot(&self) -> Option<core::num::NonZeroUsize> {
        self.loc.get()
    }

    #[inline]
    pub(crate) fn slot_cell(&self) -> &SlotCell {
        &self.loc
    }
}

// Descriptors are statics shared by every thread.
static_assertions::assert_impl_all!(EmutlsObject: Send, Sync);

impl core::fmt::Debug for EmutlsObject {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EmutlsObject")
            .field("size", &self.size())
            .field("align", &self.align())
            .field("templ", &self.template())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::EmutlsObject;

    static T1: [u8; 4] = [1, 1, 1, 1];
    static T2: [u8; 8] = [2, 2, 2, 2, 2, 2, 2, 2];

    #[test]
    fn merge_takes_maximum_layout() {
        let obj = EmutlsObject::new(0, 0);
        unsafe { obj.register(4, 4, T1.as_ptr()) };
        unsafe { obj.register(8, 8, T2.as_ptr()) };

        assert_eq!(obj.size(), 8);
        assert_eq!(obj.align(), 8);
        assert_eq!(obj.template(), T2.as_ptr());
    }

    #[test]
    fn merge_is_order_independent() {
        let obj = EmutlsObject::new(0, 0);
        unsafe { obj.register(8, 8, T2.as_ptr()) };
        unsafe { obj.register(4, 4, T1.as_ptr()) };

        // The stale 4-byte template is rejected against the 8-byte layout.
        assert_eq!(obj.size(), 8);
        assert_eq!(obj.align(), 8);
        assert_eq!(obj.template(), T2.as_ptr());
    }

    #[test]
    fn growing_size_discards_stale_template() {
        let obj = EmutlsObject::new(0, 0);
        unsafe { obj.register(4, 4, T1.as_ptr()) };
        // A later, larger registration without a template of its own.
        unsafe { obj.register(8, 4, core::ptr::null()) };

        assert_eq!(obj.size(), 8);
        assert!(obj.template().is_null());
    }

    #[test]
    fn reregistration_is_idempotent() {
        let obj = EmutlsObject::new(0, 0);
        for _ in 0..3 {
            unsafe { obj.register(8, 8, T2.as_ptr()) };
        }
        assert_eq!(obj.size(), 8);
        assert_eq!(obj.align(), 8);
        assert_eq!(obj.template(), T2.as_ptr());
    }
}
