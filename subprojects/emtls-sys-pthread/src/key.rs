//! # Thread-specific storage keys
//!
//! A wrapper around `pthread_key_create` / `pthread_getspecific` /
//! `pthread_setspecific` / `pthread_key_delete`.
//!
//! A [`Key`] maps to one pointer-sized cell in every thread. A destructor
//! registered at creation time runs at thread exit for every thread whose
//! cell holds a non-null value. POSIX runs the destructor pass in multiple
//! rounds: a destructor that stores a new non-null value into its own cell
//! (via [`Key::set`]) is invoked again in the next round, up to the
//! platform's iteration limit. The TLS runtime's exit coordinator leans on
//! exactly that re-registration behaviour to defer deallocation.

use core::ffi::c_void;

/// Destructor callback invoked at thread exit for non-null cell values.
pub type Destructor = unsafe extern "C" fn(*mut c_void);

/// A process-wide thread-specific storage key.
///
/// Copyable handle; the underlying key lives until [`Key::delete`] is called.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Key(libc::pthread_key_t);

impl Key {
    /// Creates a new key, optionally registering `destructor` to run at
    /// thread exit for every thread that stored a non-null value.
    pub fn create(destructor: Option<Destructor>) -> Result<Self, KeyCreateError> {
        let mut raw: libc::pthread_key_t = 0;
        // SAFETY: `raw` is a valid out-pointer; the destructor, if any, is a
        // plain C function pointer that outlives the key.
        let rc = unsafe { libc::pthread_key_create(&mut raw, destructor) };
        match rc {
            0 => Ok(Self(raw)),
            libc::EAGAIN => Err(KeyCreateError::LimitReached),
            libc::ENOMEM => Err(KeyCreateError::OutOfMemory),
            other => Err(KeyCreateError::Unknown(other)),
        }
    }

    /// Reconstructs a key from its raw representation.
    ///
    /// Only meaningful for values previously obtained from [`Key::into_raw`];
    /// a fabricated raw key refers to nothing and must not be used.
    #[inline]
    pub const fn from_raw(raw: libc::pthread_key_t) -> Self {
        Self(raw)
    }

    /// Returns the raw `pthread_key_t`.
    #[inline]
    pub const fn into_raw(self) -> libc::pthread_key_t {
        self.0
    }

    /// Returns the calling thread's cell value, or null if never set.
    #[inline]
    pub fn get(self) -> *mut c_void {
        // SAFETY: `pthread_getspecific` on a live key has no preconditions;
        // on a deleted key it returns an unspecified value, which is the
        // caller's contract to avoid (see `delete`).
        unsafe { libc::pthread_getspecific(self.0) }
    }

    /// Stores `value` into the calling thread's cell.
    ///
    /// # Safety
    ///
    /// If a destructor was registered, `value` must remain valid until the
    /// destructor consumes it at thread exit (or until it is overwritten).
    pub unsafe fn set(self, value: *mut c_void) -> Result<(), KeySetError> {
        // SAFETY: key liveness is the caller's contract; the call itself
        // only writes the calling thread's cell.
        let rc = unsafe { libc::pthread_setspecific(self.0, value) };
        match rc {
            0 => Ok(()),
            libc::ENOMEM => Err(KeySetError::OutOfMemory),
            libc::EINVAL => Err(KeySetError::InvalidKey),
            other => Err(KeySetError::Unknown(other)),
        }
    }

    /// Deletes the key. No destructors run for values still stored.
    ///
    /// # Safety
    ///
    /// No thread may use this key (or any copy of it) after deletion, and
    /// the caller is responsible for any cleanup the skipped destructors
    /// would have performed.
    pub unsafe fn delete(self) -> Result<(), KeyDeleteError> {
        // SAFETY: the caller guarantees the key is live and unused hereafter.
        let rc = unsafe { libc::pthread_key_delete(self.0) };
        match rc {
            0 => Ok(()),
            libc::EINVAL => Err(KeyDeleteError::InvalidKey),
            other => Err(KeyDeleteError::Unknown(other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeyCreateError {
    /// The per-process key quota (`PTHREAD_KEYS_MAX`) has been exhausted.
    #[error("thread-specific key limit reached")]
    LimitReached,
    #[error("insufficient memory to create a thread-specific key")]
    OutOfMemory,
    #[error("unexpected error code {0}")]
    Unknown(i32),
}

#[derive(Debug, thiserror::Error)]
pub enum KeySetError {
    #[error("insufficient memory to associate the value with the key")]
    OutOfMemory,
    #[error("invalid thread-specific key")]
    InvalidKey,
    #[error("unexpected error code {0}")]
    Unknown(i32),
}

#[derive(Debug, thiserror::Error)]
pub enum KeyDeleteError {
    #[error("invalid thread-specific key")]
    InvalidKey,
    #[error("unexpected error code {0}")]
    Unknown(i32),
}

#[cfg(test)]
mod tests {
    extern crate std;

    use core::ffi::c_void;
    use std::thread;

    use super::Key;

    #[test]
    fn get_set_roundtrip() {
        let key = Key::create(None).unwrap();
        assert!(key.get().is_null());

        let mut value = 7u32;
        unsafe { key.set((&raw mut value).cast()).unwrap() };
        assert_eq!(key.get(), (&raw mut value).cast());

        unsafe { key.set(core::ptr::null_mut()).unwrap() };
        assert!(key.get().is_null());
        unsafe { key.delete().unwrap() };
    }

    #[test]
    fn cells_are_per_thread() {
        let key = Key::create(None).unwrap();
        let mut value = 1u32;
        unsafe { key.set((&raw mut value).cast()).unwrap() };

        // A fresh thread starts with a null cell for the same key.
        thread::spawn(move || assert!(key.get().is_null()))
            .join()
            .unwrap();

        assert_eq!(key.get(), (&raw mut value).cast());
        unsafe { key.set(core::ptr::null_mut()).unwrap() };
        unsafe { key.delete().unwrap() };
    }

    #[test]
    fn destructor_runs_at_thread_exit() {
        static mut DROPPED: *mut c_void = core::ptr::null_mut();

        unsafe extern "C" fn record(value: *mut c_void) {
            unsafe { DROPPED = value };
        }

        let key = Key::create(Some(record)).unwrap();
        let sentinel = 0xA5u8;
        let raw = std::boxed::Box::into_raw(std::boxed::Box::new(sentinel));

        let raw_addr = raw as usize;
        thread::spawn(move || unsafe { key.set(raw_addr as *mut c_void).unwrap() })
            .join()
            .unwrap();

        assert_eq!(unsafe { DROPPED }, raw.cast());
        drop(unsafe { std::boxed::Box::from_raw(raw) });
        unsafe { key.delete().unwrap() };
    }
}
