//! Setup context handed to `Plugin::setup`.
//!
//! The context is the plugin's capability-scoped view of the manager while
//! its setup runs. Creating one pushes the plugin onto the initialization
//! stack, dropping it pops, whether setup succeeded, failed, panicked or
//! its future was dropped mid-way.

use crate::core::{Namespace, PluginId, Result};
use crate::plugin::host::Module;
use crate::plugin::manager::{PluginManager, PluginState};
use std::sync::Arc;

/// Scoped access to the manager during one plugin's setup.
pub struct SetupContext<'a> {
    manager: &'a mut PluginManager,
    plugin: PluginId,
}

impl<'a> SetupContext<'a> {
    pub(crate) fn enter(manager: &'a mut PluginManager, plugin: PluginId) -> Self {
        manager.tracker_mut().enter(plugin.clone());
        Self { manager, plugin }
    }

    /// The plugin this context was created for.
    pub fn plugin(&self) -> &PluginId {
        &self.plugin
    }

    /// The innermost plugin whose setup is running.
    pub fn current_plugin(&self) -> Result<&PluginId> {
        self.manager.current_plugin()
    }

    /// Reference another plugin, loading it if needed.
    ///
    /// Records a dependency from the current plugin on `name` and on every
    /// enclosing plugin package, then returns `name`'s module.
    pub async fn import(&mut self, name: &str) -> Result<Arc<Module>> {
        self.manager.import(name).await
    }

    /// Register cleanup to run when the current plugin goes away, or right
    /// after a failed setup.
    pub fn register_finalizer<F>(&mut self, action: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.manager.register_finalizer(action)
    }

    /// Lifecycle state of any plugin.
    pub fn state(&self, name: &str) -> Result<PluginState> {
        self.manager.state(name)
    }

    /// The namespace plugin names live in.
    pub fn namespace(&self) -> &Namespace {
        self.manager.namespace()
    }
}

impl Drop for SetupContext<'_> {
    fn drop(&mut self) {
        self.manager.tracker_mut().exit(&self.plugin);
    }
}
