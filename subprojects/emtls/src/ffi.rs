//! C ABI entry points for compiler-generated code.
//!
//! These two symbols are the entire external surface of the runtime. They
//! are called by generated code only — `__emutls_register_common` once per
//! translation unit that defines a variable, `__emutls_get_address` at
//! every read or write of one — never by application logic.

use core::ffi::c_void;

use crate::object::EmutlsObject;

/// Registers (or re-registers) a variable's layout and initializer.
///
/// Repeated calls for the same logical variable merge: size and alignment
/// take the maximum seen, and `templ` is kept only when its size matches
/// the merged size.
///
/// # Safety
///
/// - `obj` must point to a live descriptor emitted by generated code.
/// - `templ`, when non-null, must point to at least `size` readable bytes
///   and remain valid for the rest of the process lifetime.
/// - Calls for one descriptor must not race with each other or with
///   accesses (the loader serializes them).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __emutls_register_common(
    obj: *mut EmutlsObject,
    size: usize,
    align: usize,
    templ: *mut c_void,
) {
    // SAFETY: forwarded from the caller's contract.
    unsafe { (*obj).register(size, align, templ.cast_const().cast()) }
}

/// Returns the calling thread's instance of the variable, creating it on
/// first access. The address is stable until the thread exits.
///
/// # Safety
///
/// `obj` must point to a live descriptor that was registered (or emitted
/// with its layout filled in) before any access.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __emutls_get_address(obj: *mut EmutlsObject) -> *mut c_void {
    // SAFETY: the descriptor is live per the caller's contract.
    crate::get_address(unsafe { &*obj }).as_ptr().cast()
}
