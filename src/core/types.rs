//! Common types used across hotload modules.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

/// Unique, namespace-qualified plugin name (e.g. `plugins.commands`).
///
/// Only produced by [`Namespace::identify`], so every value is a plugin.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PluginId(String);

impl PluginId {
    /// The full dotted name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last dotted component.
    pub fn short_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

impl std::fmt::Display for PluginId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PluginId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PluginId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The dotted prefix under which names are treated as plugins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace(String);

impl Namespace {
    /// Create a namespace. The root must be non-empty without leading or
    /// trailing dots.
    pub fn new(root: &str) -> Result<Self> {
        if root.is_empty() || root.starts_with('.') || root.ends_with('.') {
            return Err(Error::Config(format!("invalid plugin namespace {:?}", root)));
        }
        Ok(Self(root.to_string()))
    }

    /// The namespace root, e.g. `plugins`.
    pub fn root(&self) -> &str {
        &self.0
    }

    /// Whether `name` lives inside the namespace.
    pub fn is_plugin(&self, name: &str) -> bool {
        name.len() > self.0.len() + 1
            && name.starts_with(self.0.as_str())
            && name.as_bytes()[self.0.len()] == b'.'
    }

    /// Turn a name into a plugin identity, or fail with a usage error.
    pub fn identify(&self, name: &str) -> Result<PluginId> {
        if self.is_plugin(name) {
            Ok(PluginId(name.to_string()))
        } else {
            Err(Error::NotAPlugin(name.to_string()))
        }
    }

    /// Every dotted prefix of `name` that is a plugin identity, shortest
    /// first. `plugins.a.b` yields `plugins.a` then `plugins.a.b`.
    pub fn prefixes(&self, name: &str) -> Vec<PluginId> {
        let mut out = Vec::new();
        for (idx, ch) in name.char_indices() {
            if ch == '.' && self.is_plugin(&name[..idx]) {
                out.push(PluginId(name[..idx].to_string()));
            }
        }
        if self.is_plugin(name) {
            out.push(PluginId(name.to_string()));
        }
        out
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self("plugins".to_string())
    }
}

/// Timestamp wrapper for consistent serialization.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Get current UTC timestamp.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}
