//! Finalizer registry.
//!
//! Cleanup actions registered during a plugin's setup, drained exactly once
//! when the plugin is unloaded, reloaded or torn down.

use crate::core::{Error, ErrorCollector, PluginId, Result};
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

/// A zero-argument cleanup action.
pub type Finalizer = Box<dyn FnOnce() -> Result<()> + Send>;

/// Ordered finalizers per plugin.
#[derive(Default)]
pub struct FinalizerRegistry {
    entries: BTreeMap<PluginId, VecDeque<Finalizer>>,
}

impl FinalizerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finalizer to `id`'s sequence.
    pub fn register(&mut self, id: PluginId, action: Finalizer) {
        self.entries.entry(id).or_default().push_back(action);
    }

    /// Number of pending finalizers for `id`.
    pub fn pending(&self, id: &str) -> usize {
        self.entries.get(id).map_or(0, VecDeque::len)
    }

    /// Run every finalizer of `id` in registration order.
    ///
    /// A failing or panicking finalizer does not stop the ones after it;
    /// all failures are reported together once the sequence is done. The
    /// entry is removed only after every action has been attempted.
    pub fn finalize(&mut self, id: &PluginId) -> Result<()> {
        let Some(actions) = self.entries.get_mut(id) else {
            return Ok(());
        };
        debug!(plugin = %id, count = actions.len(), "running finalizers");

        let mut errors = ErrorCollector::new();
        let mut index = 0;
        while let Some(action) = actions.pop_front() {
            match panic::catch_unwind(AssertUnwindSafe(action)) {
                Ok(Ok(())) => {}
                Ok(Err(source)) => errors.push(Error::FinalizerFailed {
                    plugin: id.to_string(),
                    index,
                    source: Box::new(source),
                }),
                Err(payload) => errors.push(Error::FinalizerPanicked {
                    plugin: id.to_string(),
                    index,
                    message: panic_message(payload.as_ref()),
                }),
            }
            index += 1;
        }
        self.entries.remove(id);

        errors.finish()
    }
}

impl std::fmt::Debug for FinalizerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: BTreeMap<&PluginId, usize> =
            self.entries.iter().map(|(id, v)| (id, v.len())).collect();
        f.debug_struct("FinalizerRegistry")
            .field("entries", &counts)
            .finish()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
