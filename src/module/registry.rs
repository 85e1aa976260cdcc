//! Live Module Registry - non-owning cache of already-loaded images
//!
//! Repeated requests for the same identity return the instance somebody is
//! still holding instead of reading and parsing the file again. Entries are
//! weak: the registry never keeps a module alive.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use super::identity::ModuleIdentity;
use super::loader::LoadedModule;

/// Map from identity to a weak reference on the loaded module
#[derive(Debug, Default)]
pub struct LiveModuleRegistry {
    entries: Mutex<HashMap<ModuleIdentity, Weak<LoadedModule>>>,
}

impl LiveModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a strong handle if the module is still held elsewhere.
    /// A dead entry is purged and reported as absent.
    pub fn lookup(&self, identity: &ModuleIdentity) -> Option<Arc<LoadedModule>> {
        let mut entries = self.lock();
        let module = entries.get(identity)?.upgrade();
        if module.is_none() {
            log::trace!("Purging dead registry entry for {}", identity);
            entries.remove(identity);
        }
        module
    }

    /// Record a weak reference to `module` under `identity`
    pub fn register(&self, identity: ModuleIdentity, module: &Arc<LoadedModule>) {
        self.lock().insert(identity, Arc::downgrade(module));
    }

    /// Number of entries, dead ones included until their next lookup
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ModuleIdentity, Weak<LoadedModule>>> {
        // The map holds no invariant a panicking holder could break
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
