//! # hotload - Live-reloadable plugins
//!
//! A plugin manager that:
//! - **Tracks dependencies**: every import made during a plugin's setup
//!   becomes an edge in a dependency graph
//! - **Finalizes deterministically**: cleanup registered during setup runs
//!   exactly once, in order, when the plugin goes away
//! - **Reloads in place**: a plugin is reloaded together with everything
//!   that depends on it, in dependency order
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use hotload::plugin::{exports, Catalog, Exports, Plugin, PluginInfo, SetupContext};
//! use hotload::{runtime, ManagerConfig, PluginManager, Result};
//!
//! struct Autoload;
//!
//! #[async_trait]
//! impl Plugin for Autoload {
//!     fn info(&self) -> PluginInfo {
//!         PluginInfo::new("plugins.autoload", "Autoload", "0.1.0")
//!     }
//!
//!     async fn setup(&self, ctx: &mut SetupContext<'_>) -> Result<Exports> {
//!         ctx.register_finalizer(|| {
//!             println!("goodbye");
//!             Ok(())
//!         })?;
//!         Ok(exports(()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let catalog = Catalog::new();
//!     catalog.register(Autoload)?;
//!
//!     let mut manager = PluginManager::new(ManagerConfig::default(), catalog)?;
//!
//!     // Clone the handle into whatever issues reloads at runtime
//!     let (handle, commands) = runtime::channel(16);
//!     let _console = handle.clone();
//!     runtime::run(&mut manager, commands, runtime::ctrl_c()).await
//! }
//! ```

pub mod core;
pub mod graph;
pub mod monitoring;
pub mod plugin;
pub mod runtime;

pub use crate::core::config::ManagerConfig;
pub use crate::core::error::{AggregateError, Error, Result};
pub use graph::Digraph;
pub use plugin::{PluginManager, PluginState};
pub use runtime::{Command, ManagerHandle};
