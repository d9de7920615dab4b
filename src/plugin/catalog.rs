//! Plugin catalog: the in-memory source of plugin code.
//!
//! Resolves plugin names to their implementations. Entries can be swapped
//! at runtime so the next load or reload picks up new code.

use crate::core::{Error, Result};
use crate::plugin::host::PluginLoader;
use crate::plugin::interface::{Plugin, PluginInfo};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Plugin catalog.
#[derive(Default)]
pub struct Catalog {
    /// Registered plugin code by fully qualified name
    plugins: RwLock<HashMap<String, Arc<dyn Plugin>>>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under its `info().id`.
    pub fn register(&self, plugin: impl Plugin + 'static) -> Result<()> {
        let id = plugin.info().id;
        let mut plugins = self.plugins.write().unwrap_or_else(PoisonError::into_inner);

        if plugins.contains_key(&id) {
            return Err(Error::DuplicatePlugin(id));
        }
        plugins.insert(id, Arc::new(plugin));
        Ok(())
    }

    /// Register or swap in new code, returning the previous entry.
    pub fn replace(&self, plugin: impl Plugin + 'static) -> Option<Arc<dyn Plugin>> {
        let id = plugin.info().id;
        self.plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(plugin))
    }

    /// Remove a plugin's code. Already loaded instances are unaffected.
    pub fn unregister(&self, name: &str) -> Result<()> {
        self.plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))
    }

    /// List all plugins, sorted by id.
    pub fn list(&self) -> Vec<PluginInfo> {
        let mut infos: Vec<PluginInfo> = self
            .plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|p| p.info())
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Get plugin count.
    pub fn len(&self) -> usize {
        self.plugins.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PluginLoader for Catalog {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn contains(&self, name: &str) -> bool {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}
