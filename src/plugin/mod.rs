//! Plugin Module
//!
//! Live-reloadable plugin architecture:
//! - Plugin interface and catalog of available plugins
//! - Dependency tracking during setup
//! - Finalizers and lifecycle management

pub mod catalog;
pub mod context;
pub mod finalizer;
pub mod host;
pub mod interface;
pub mod manager;
pub mod tracker;

#[cfg(test)]
pub(crate) mod fixtures;

pub use catalog::Catalog;
pub use context::SetupContext;
pub use finalizer::{Finalizer, FinalizerRegistry};
pub use host::{Module, ModuleHost, PluginLoader};
pub use interface::{exports, Exports, Plugin, PluginInfo};
pub use manager::{PluginManager, PluginState};
pub use tracker::DependencyTracker;
