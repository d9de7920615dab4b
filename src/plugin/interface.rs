//! Plugin interface definition.
//!
//! Defines the interface plugins must implement.

use crate::core::Result;
use crate::plugin::context::SetupContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;

/// Whatever a plugin hands out to the plugins that import it.
pub type Exports = Arc<dyn Any + Send + Sync>;

/// Wrap a value as plugin exports.
pub fn exports<T: Any + Send + Sync>(value: T) -> Exports {
    Arc::new(value)
}

/// Plugin information.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin ID, the fully qualified name (e.g. `plugins.admin`)
    pub id: String,
    /// Human readable name
    pub name: String,
    /// Version
    pub version: String,
    /// Description
    pub description: String,
}

impl PluginInfo {
    /// Create new plugin info.
    pub fn new(id: &str, name: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            description: String::new(),
        }
    }

    /// Set description.
    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }
}

/// Plugin trait that all plugins must implement.
///
/// `setup` is the plugin body. Everything it touches through `ctx` is
/// tracked: imported plugins become dependencies, registered finalizers run
/// when the plugin goes away.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Get plugin info.
    fn info(&self) -> PluginInfo;

    /// Initialize the plugin and return its exports.
    async fn setup(&self, ctx: &mut SetupContext<'_>) -> Result<Exports>;
}
