//! Plugin manager configuration.
//!
//! Configuration-driven namespace, autoload and teardown behavior.

use crate::core::error::{Error, Result};
use crate::core::types::Namespace;
use crate::monitoring::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Plugin manager configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Namespace root; names under `<namespace>.` are plugins
    pub namespace: String,
    /// Plugin loaded when the service loop starts
    pub autoload: Option<String>,
    /// Unload everything when the manager is dropped
    pub teardown_on_drop: bool,
    /// Logging setup
    pub logging: LoggingConfig,
}

impl ManagerConfig {
    /// Config with a custom namespace and no autoload plugin.
    pub fn with_namespace(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            autoload: None,
            ..Default::default()
        }
    }

    /// Set the autoload plugin.
    pub fn with_autoload(mut self, name: &str) -> Self {
        self.autoload = Some(name.to_string());
        self
    }

    /// Disable teardown in `Drop`.
    pub fn without_teardown(mut self) -> Self {
        self.teardown_on_drop = false;
        self
    }

    /// Parse from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file and validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// The parsed namespace.
    pub fn namespace(&self) -> Result<Namespace> {
        Namespace::new(&self.namespace)
    }

    /// Check the namespace and that autoload lives inside it.
    pub fn validate(&self) -> Result<()> {
        let ns = self.namespace()?;
        if let Some(autoload) = &self.autoload {
            if !ns.is_plugin(autoload) {
                return Err(Error::Config(format!(
                    "autoload {} is outside namespace {}",
                    autoload,
                    ns.root()
                )));
            }
        }
        Ok(())
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            namespace: "plugins".to_string(),
            autoload: Some("plugins.autoload".to_string()),
            teardown_on_drop: true,
            logging: LoggingConfig::default(),
        }
    }
}
