//! Host module system.
//!
//! Resolves plugin identities to code and owns the registry of loaded
//! modules. The registry is the single source of truth for "is this plugin
//! loaded"; graph and finalizer bookkeeping live alongside it.

use crate::core::{now, Error, PluginId, Result, Timestamp};
use crate::plugin::interface::{Exports, Plugin};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Source of plugin code.
pub trait PluginLoader: Send + Sync {
    /// Find the code for a fully qualified plugin name.
    fn resolve(&self, name: &str) -> Option<Arc<dyn Plugin>>;

    /// Whether `name` names loadable code.
    fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }
}

impl<L: PluginLoader + ?Sized> PluginLoader for Arc<L> {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        (**self).resolve(name)
    }

    fn contains(&self, name: &str) -> bool {
        (**self).contains(name)
    }
}

/// A loaded plugin instance.
#[derive(Clone)]
pub struct Module {
    /// Plugin identity
    id: PluginId,
    /// Unique per successful setup
    instance: Uuid,
    /// How many times this identity has been loaded, starting at 1
    generation: u64,
    /// When setup completed
    loaded_at: Timestamp,
    /// Values handed to importers
    exports: Exports,
}

impl Module {
    /// Plugin identity.
    pub fn id(&self) -> &PluginId {
        &self.id
    }

    /// Id of this particular load.
    pub fn instance(&self) -> Uuid {
        self.instance
    }

    /// Load count for this identity, starting at 1.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When setup completed.
    pub fn loaded_at(&self) -> Timestamp {
        self.loaded_at
    }

    /// Typed access to the exports.
    pub fn exports<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.exports.clone().downcast::<T>().ok()
    }

    /// Untyped exports.
    pub fn raw_exports(&self) -> &Exports {
        &self.exports
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("instance", &self.instance)
            .field("generation", &self.generation)
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// Loader plus loaded-module registry.
pub struct ModuleHost {
    loader: Box<dyn PluginLoader>,
    loaded: BTreeMap<PluginId, Arc<Module>>,
    generations: BTreeMap<PluginId, u64>,
}

impl ModuleHost {
    /// Create a host over a loader with nothing loaded.
    pub fn new(loader: impl PluginLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            loaded: BTreeMap::new(),
            generations: BTreeMap::new(),
        }
    }

    /// Resolve the code for `id`.
    pub fn resolve(&self, id: &PluginId) -> Result<Arc<dyn Plugin>> {
        self.loader
            .resolve(id.as_str())
            .ok_or_else(|| Error::PluginNotFound(id.to_string()))
    }

    /// Whether the loader has code for `id`.
    pub fn knows(&self, id: &PluginId) -> bool {
        self.loader.contains(id.as_str())
    }

    /// The loaded module for `id`.
    pub fn get(&self, id: &str) -> Option<&Arc<Module>> {
        self.loaded.get(id)
    }

    /// Whether `id` is loaded.
    pub fn is_loaded(&self, id: &str) -> bool {
        self.loaded.contains_key(id)
    }

    /// Record a freshly set up module, replacing any previous instance.
    pub fn insert(&mut self, id: PluginId, exports: Exports) -> Arc<Module> {
        let generation = self.generations.entry(id.clone()).or_insert(0);
        *generation += 1;

        let module = Arc::new(Module {
            id: id.clone(),
            instance: Uuid::new_v4(),
            generation: *generation,
            loaded_at: now(),
            exports,
        });
        self.loaded.insert(id, module.clone());
        module
    }

    /// Drop a module from the registry.
    pub fn remove(&mut self, id: &str) -> Option<Arc<Module>> {
        self.loaded.remove(id)
    }

    /// Identities of all loaded modules, sorted.
    pub fn loaded_ids(&self) -> Vec<PluginId> {
        self.loaded.keys().cloned().collect()
    }

    /// Number of loaded modules.
    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    /// Whether nothing is loaded.
    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}
