//! # emtls-alloc
//!
//! Aligned storage blocks for the emulated-TLS runtime.
//!
//! The platform heap only guarantees pointer-size alignment; thread-local
//! variables may demand more. This crate over-allocates as needed and keeps a
//! hidden back-pointer to the raw allocation immediately before the address
//! it hands out, so a block can be released without re-deriving any
//! alignment arithmetic.
//!
//! Allocation failure aborts the process: this crate sits below every
//! error-propagation layer and has nothing to fall back to.

#![no_std]

mod block;
pub mod stats;

#[doc(inline)]
pub use self::block::Block;
