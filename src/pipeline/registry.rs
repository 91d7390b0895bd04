// src/pipeline/registry.rs
//! The process-wide module registry
//!
//! Maps qualified names to loaded module handles. The interception engine
//! reads and mutates it only through this narrow get/set/remove/keys
//! surface, which is also everything the stash-and-restore logic needs.

use crate::pipeline::module::ModuleHandle;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::trace;

/// Qualified name to module handle mapping
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, ModuleHandle>>,
}

impl ModuleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle registered under `name`, if any
    pub fn get(&self, name: &str) -> Option<ModuleHandle> {
        self.modules.read().get(name).cloned()
    }

    /// Register `module` under `name`, overwriting any previous entry
    pub fn set(&self, name: impl Into<String>, module: ModuleHandle) {
        let name = name.into();
        trace!("registry set: {}", name);
        self.modules.write().insert(name, module);
    }

    /// Remove and return the entry under `name`
    pub fn remove(&self, name: &str) -> Option<ModuleHandle> {
        trace!("registry remove: {}", name);
        self.modules.write().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.read().contains_key(name)
    }

    /// Snapshot of all registered names
    pub fn keys(&self) -> Vec<String> {
        self.modules.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let registry = ModuleRegistry::new();
        let module = ModuleHandle::new("pkg.mod");

        registry.set("pkg.mod", module.clone());
        assert!(registry.contains("pkg.mod"));
        assert!(registry.get("pkg.mod").unwrap().same(&module));

        let removed = registry.remove("pkg.mod").unwrap();
        assert!(removed.same(&module));
        assert!(registry.get("pkg.mod").is_none());
        assert!(registry.remove("pkg.mod").is_none());
    }

    #[test]
    fn test_set_overwrites() {
        let registry = ModuleRegistry::new();
        let first = ModuleHandle::new("pkg");
        let second = ModuleHandle::new("pkg");

        registry.set("pkg", first);
        registry.set("pkg", second.clone());

        assert_eq!(registry.len(), 1);
        assert!(registry.get("pkg").unwrap().same(&second));
    }

    #[test]
    fn test_keys_snapshot() {
        let registry = ModuleRegistry::new();
        registry.set("a", ModuleHandle::new("a"));
        registry.set("a.b", ModuleHandle::new("a.b"));

        let mut keys = registry.keys();
        keys.sort();
        assert_eq!(keys, vec!["a", "a.b"]);
    }
}
