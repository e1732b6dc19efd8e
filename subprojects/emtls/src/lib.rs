//! # emtls
//!
//! Emulated thread-local storage for targets where the compiler and linker
//! cannot provide native TLS.
//!
//! Generated code interacts with this runtime through two entry points: one
//! registers (or re-registers) a variable's size, alignment, and initializer
//! template; the other returns the calling thread's instance of the
//! variable, lazily creating it on first access. The entry points are a C
//! ABI, exported under the `ffi` cargo feature; the Rust API underneath is
//! what the tests exercise.
//!
//! ## Architecture
//!
//! - [`object`] — the ABI descriptor ([`EmutlsObject`]) and the merge rules
//!   for repeated registrations of the same logical variable.
//! - [`registry`] — process-wide slot assignment: a lazily-assigned
//!   monotonic id per descriptor, double-checked against a global mutex.
//! - [`store`] — the per-thread growable array mapping slot index to
//!   storage block.
//! - [`exit`] — thread-exit sequencing: destructor-round deferral and the
//!   final release of a thread's blocks and store.
//! - [`runtime`] — the process-wide service tying the above together.
//!
//! Storage for one (variable, thread) pair keeps a stable address from first
//! access until thread exit. No thread is ever handed another thread's
//! storage.
//!
//! ## Single-threaded fallback
//!
//! Built without the default `threads` feature, the runtime keeps exactly
//! one global instance per descriptor inside the descriptor itself — no
//! lock, no key, no per-thread array.

#![no_std]

extern crate alloc;

use core::ptr::NonNull;

mod object;
#[cfg(feature = "ffi")]
mod ffi;
#[cfg(not(feature = "threads"))]
mod single;

#[cfg(feature = "threads")]
pub mod exit;
pub mod registry;
#[cfg(feature = "threads")]
pub mod runtime;
#[cfg(feature = "threads")]
pub mod store;

pub use self::object::EmutlsObject;
#[cfg(feature = "threads")]
pub use self::runtime::Runtime;

/// Returns the calling thread's instance of the variable described by
/// `obj`, creating it on first access.
///
/// The returned address is stable for this (variable, thread) pair until
/// the thread exits. The hot path — descriptor already has a slot, block
/// already exists — takes no lock.
#[inline]
pub fn get_address(obj: &EmutlsObject) -> NonNull<u8> {
    #[cfg(feature = "threads")]
    {
        Runtime::global().get_address(obj)
    }
    #[cfg(not(feature = "threads"))]
    {
        single::get_address(obj)
    }
}
