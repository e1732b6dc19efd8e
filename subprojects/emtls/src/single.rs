//! Single-threaded fallback.
//!
//! For targets with no threading capability at all there is nothing to
//! partition: each descriptor gets exactly one instance for the whole
//! process, and its address is cached directly in the descriptor's slot
//! cell. No lock, no thread-specific key, no per-thread array — and no
//! cleanup either, since the instance lives until process exit.

use core::ptr::NonNull;

use emtls_alloc::Block;

use crate::object::EmutlsObject;

/// Returns the process-wide instance of `obj`, creating it on first access.
pub(crate) fn get_address(obj: &EmutlsObject) -> NonNull<u8> {
    if let Some(ptr) = obj.slot_cell().instance_ptr() {
        return ptr;
    }

    // SAFETY: the descriptor's template contract covers `size()` readable
    // bytes.
    let block = unsafe { Block::allocate(obj.size(), obj.align(), obj.template()) };
    let user = block.into_raw();
    obj.slot_cell().set_instance_ptr(user);
    user
}

#[cfg(test)]
mod tests {
    use crate::object::EmutlsObject;

    use super::get_address;

    static TEMPL: [u8; 4] = [9, 8, 7, 6];

    #[test]
    fn caches_one_instance() {
        let obj = EmutlsObject::new(16, 16);
        let first = get_address(&obj);
        let second = get_address(&obj);
        assert_eq!(first, second);
        assert_eq!(first.as_ptr() as usize % 16, 0);
    }

    #[test]
    fn initializes_from_template() {
        let obj = unsafe { EmutlsObject::with_template(4, 4, TEMPL.as_ptr().cast_mut()) };
        let addr = get_address(&obj);
        let bytes = unsafe { core::slice::from_raw_parts(addr.as_ptr(), 4) };
        assert_eq!(bytes, &TEMPL);
    }
}
