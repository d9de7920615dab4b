//! Dependency discovery.
//!
//! Keeps the stack of plugins whose setup is in progress and turns imports
//! made during setup into dependency edges.

use crate::core::{Error, PluginId, Result};
use crate::graph::Digraph;
use tracing::debug;

/// Stack of in-progress plugin initializations.
#[derive(Clone, Debug, Default)]
pub struct DependencyTracker {
    stack: Vec<PluginId>,
}

impl DependencyTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `id` on entry to its setup.
    pub fn enter(&mut self, id: PluginId) {
        debug!(plugin = %id, depth = self.stack.len(), "entering plugin setup");
        self.stack.push(id);
    }

    /// Pop `id` on exit from its setup, however it ended.
    pub fn exit(&mut self, id: &PluginId) {
        match self.stack.pop() {
            Some(top) => debug_assert_eq!(&top, id, "setup contexts must nest"),
            None => debug_assert!(false, "exit without matching enter for {}", id),
        }
    }

    /// The plugin whose setup is innermost.
    pub fn current(&self) -> Result<&PluginId> {
        self.stack.last().ok_or(Error::NotInitializing)
    }

    /// Whether `id` is anywhere on the stack.
    pub fn is_initializing(&self, id: &str) -> bool {
        self.stack.iter().any(|p| p.as_str() == id)
    }

    /// Number of nested setups in progress.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Outermost to innermost, e.g. `plugins.a -> plugins.b`.
    pub fn chain(&self) -> String {
        self.stack
            .iter()
            .map(PluginId::as_str)
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Record that the current plugin references each of `targets`.
    pub fn record_import(&self, graph: &mut Digraph<PluginId>, targets: &[PluginId]) -> Result<()> {
        let current = self.current()?;
        for target in targets {
            if !graph.has_edge(current, target) {
                debug!(dependent = %current, dependency = %target, "dependency discovered");
            }
            graph.add_edge(current.clone(), target.clone());
        }
        Ok(())
    }
}
