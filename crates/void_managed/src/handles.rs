//! Opaque instance handles for native code
//!
//! A handle is an independent strong reference to an instance. It is not
//! tied to the entity map: releasing a handle leaves the entity's entry in
//! place, and dropping the entity's entry leaves the handle resolvable.

use crate::error::{Result, ScriptError};
use crate::instance::SharedInstance;
use std::sync::Arc;
use void_core::{Handle, HandleMap};

/// Handle to a live script instance
pub type InstanceHandle = Handle<SharedInstance>;

/// Issues and revokes instance handles
#[derive(Default)]
pub struct HandleTable {
    handles: HandleMap<SharedInstance>,
}

impl HandleTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a new reference to `instance`
    pub fn allocate(&mut self, instance: SharedInstance) -> InstanceHandle {
        let handle = self.handles.insert(instance);
        log::debug!("Allocated handle {:#x}", handle.to_bits());
        handle
    }

    /// Resolve a handle to its instance
    ///
    /// Fails for null, unallocated or released handles, and for handles
    /// whose instance belongs to an unloaded module.
    pub fn resolve(&self, handle: InstanceHandle) -> Result<SharedInstance> {
        let instance = self.handles.get(handle).map_err(|reason| ScriptError::InvalidHandle {
            bits: handle.to_bits(),
            reason,
        })?;

        if instance.lock().is_orphaned() {
            return Err(ScriptError::OrphanedHandle(handle.to_bits()));
        }
        Ok(Arc::clone(instance))
    }

    /// Drop the reference behind `handle`
    ///
    /// Null and already-released handles are ignored. Returns whether a
    /// reference was dropped.
    pub fn release(&mut self, handle: InstanceHandle) -> bool {
        match self.handles.remove(handle) {
            Ok(_) => {
                log::debug!("Released handle {:#x}", handle.to_bits());
                true
            }
            Err(_) => false,
        }
    }

    /// Drop every outstanding reference
    pub fn release_all(&mut self) -> usize {
        let released = self.handles.drain().len();
        if released > 0 {
            log::debug!("Released {} outstanding handles", released);
        }
        released
    }

    /// Whether `handle` is currently allocated
    pub fn contains(&self, handle: InstanceHandle) -> bool {
        self.handles.contains(handle)
    }

    /// Number of outstanding handles
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no handle is outstanding
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
