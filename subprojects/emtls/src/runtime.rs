//! The process-wide runtime service.
//!
//! [`Runtime`] ties the slot registry and the exit coordinator together
//! behind one value with an explicit lifecycle: the ABI entry points use
//! the process-wide instance from [`Runtime::global`], while tests
//! construct private instances (each with its own slot counter and
//! thread-exit key) instead of fighting over module-level statics.

use core::ptr::NonNull;

use crate::{
    exit::ExitCoordinator, object::EmutlsObject, registry::SlotRegistry, store::ThreadStore,
};

/// Slot registry plus exit coordinator; one per process in production.
pub struct Runtime {
    registry: SlotRegistry,
    coordinator: ExitCoordinator,
}

/// The instance behind the ABI entry points.
static RUNTIME: Runtime = Runtime::new();

impl Runtime {
    /// Creates an empty runtime: no slots assigned, no key created.
    pub const fn new() -> Self {
        Self {
            registry: SlotRegistry::new(),
            coordinator: ExitCoordinator::new(),
        }
    }

    /// The process-wide runtime.
    #[inline]
    pub fn global() -> &'static Runtime {
        &RUNTIME
    }

    /// The slot registry of this runtime.
    #[inline]
    pub fn registry(&self) -> &SlotRegistry {
        &self.registry
    }

    /// The exit coordinator of this runtime.
    #[inline]
    pub fn coordinator(&self) -> &ExitCoordinator {
        &self.coordinator
    }

    /// Returns the calling thread's instance of `obj`, creating the
    /// thread's store and the instance as needed.
    ///
    /// Hot path (slot assigned, store present, block present): two acquire
    /// loads and an array index, no lock.
    pub fn get_address(&self, obj: &EmutlsObject) -> NonNull<u8> {
        let slot = match obj.slot_cell().get() {
            Some(slot) => slot,
            None => {
                // Key creation must precede the first slot assignment: any
                // thread that later acquire-loads a published slot index
                // must also observe the key.
                self.coordinator.ensure_init();
                self.registry.resolve(obj.slot_cell())
            }
        };

        let mut store = match self.coordinator.current_store() {
            Some(store) => store,
            None => self
                .coordinator
                .install_store(ThreadStore::new(self.coordinator.key(), slot.get())),
        };

        // SAFETY: the store is owned exclusively by the calling thread; no
        // other reference to it exists during this call.
        unsafe { store.as_mut() }.get_or_create(slot, obj)
    }

    /// Releases the runtime's thread-exit key.
    ///
    /// # Safety
    ///
    /// See [`ExitCoordinator::teardown`]: no further TLS access through
    /// this runtime from any thread, and live stores are leaked.
    pub unsafe fn teardown(&self) {
        unsafe { self.coordinator.teardown() }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
