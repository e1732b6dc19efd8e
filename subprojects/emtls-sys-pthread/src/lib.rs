//! # emtls-sys-pthread
//!
//! Thin wrappers around the POSIX thread primitives the emulated-TLS runtime
//! consumes: a statically initializable mutex, a one-time execution gate, and
//! thread-specific storage keys with per-thread destructors.
//!
//! Each wrapper maps almost one-to-one to its underlying `pthread` call while
//! translating raw `errno`-style return codes into strongly typed Rust error
//! enums. Policy lives above this crate: callers decide whether a failure is
//! recoverable (for the TLS runtime it never is, see [`abort`]).

#![no_std]

pub mod key;
pub mod mutex;
pub mod once;

#[doc(inline)]
pub use self::{key::Key, mutex::Mutex, once::Once};

/// Aborts the process immediately.
///
/// The TLS runtime sits below any error-propagation layer, so primitive
/// setup failures and heap exhaustion have no return path. This is the
/// single escape hatch for those cases.
#[inline]
pub fn abort() -> ! {
    unsafe { libc::abort() }
}
