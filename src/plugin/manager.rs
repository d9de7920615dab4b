//! Plugin lifecycle manager.
//!
//! Loads plugins with dependency tracking, and unloads or reloads a plugin
//! together with everything that transitively depends on it. Batch
//! operations attempt every unit of work and report all failures at the
//! end.

use crate::core::{Error, ErrorCollector, ManagerConfig, Namespace, PluginId, Result};
use crate::graph::Digraph;
use crate::plugin::context::SetupContext;
use crate::plugin::finalizer::{panic_message, FinalizerRegistry};
use crate::plugin::host::{Module, ModuleHost, PluginLoader};
use crate::plugin::tracker::DependencyTracker;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Lifecycle state of a plugin, derived from the manager's bookkeeping.
///
/// Finalizers run while the manager is exclusively borrowed and get no
/// handle to it, so a plugin being finalized is never observable as a
/// separate state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginState {
    /// Not in the loaded registry
    NotLoaded,
    /// Setup in progress
    Loading,
    /// Set up and registered
    Loaded,
}

/// Owner of the dependency graph, finalizers and loaded modules.
///
/// Every lifecycle operation takes `&mut self`, and a running setup holds
/// that borrow through its [`SetupContext`], so lifecycle operations never
/// overlap.
pub struct PluginManager {
    config: ManagerConfig,
    namespace: Namespace,
    graph: Digraph<PluginId>,
    finalizers: FinalizerRegistry,
    tracker: DependencyTracker,
    host: ModuleHost,
}

impl PluginManager {
    /// Create a manager over `loader` with nothing loaded.
    pub fn new(config: ManagerConfig, loader: impl PluginLoader + 'static) -> Result<Self> {
        config.validate()?;
        let namespace = config.namespace()?;
        Ok(Self {
            config,
            namespace,
            graph: Digraph::new(),
            finalizers: FinalizerRegistry::new(),
            tracker: DependencyTracker::new(),
            host: ModuleHost::new(loader),
        })
    }

    /// Create a manager with the default `plugins` namespace.
    pub fn with_loader(loader: impl PluginLoader + 'static) -> Self {
        Self {
            config: ManagerConfig::default(),
            namespace: Namespace::default(),
            graph: Digraph::new(),
            finalizers: FinalizerRegistry::new(),
            tracker: DependencyTracker::new(),
            host: ModuleHost::new(loader),
        }
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// The namespace plugin names live in.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The dependency graph (dependent -> dependency).
    pub fn graph(&self) -> &Digraph<PluginId> {
        &self.graph
    }

    pub(crate) fn tracker_mut(&mut self) -> &mut DependencyTracker {
        &mut self.tracker
    }

    /// Check that `name` is a plugin.
    pub fn identify(&self, name: &str) -> Result<PluginId> {
        self.namespace.identify(name)
    }

    /// The plugin whose setup is running. Fails outside plugin setup.
    pub fn current_plugin(&self) -> Result<&PluginId> {
        self.tracker.current()
    }

    /// Register a finalizer for the plugin whose setup is running.
    pub fn register_finalizer<F>(&mut self, action: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let current = self.tracker.current()?.clone();
        debug!(plugin = %current, "finalizer registered");
        self.finalizers.register(current, Box::new(action));
        Ok(())
    }

    /// Lifecycle state of `name`.
    pub fn state(&self, name: &str) -> Result<PluginState> {
        let id = self.identify(name)?;
        let state = if self.tracker.is_initializing(id.as_str()) {
            PluginState::Loading
        } else if self.host.is_loaded(id.as_str()) {
            PluginState::Loaded
        } else {
            PluginState::NotLoaded
        };
        Ok(state)
    }

    /// Whether `name` is in the loaded registry.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.host.is_loaded(name)
    }

    /// The loaded module for `name`, if any.
    pub fn get(&self, name: &str) -> Option<Arc<Module>> {
        self.host.get(name).cloned()
    }

    /// Identities of all loaded plugins, sorted.
    pub fn loaded_plugins(&self) -> Vec<PluginId> {
        self.host.loaded_ids()
    }

    /// Plugins `name` referenced during its setup.
    pub fn dependencies(&self, name: &str) -> Result<Vec<PluginId>> {
        let id = self.identify(name)?;
        Ok(self.graph.edges_from(&id).iter().cloned().collect())
    }

    /// Plugins that referenced `name` during their setup.
    pub fn dependents(&self, name: &str) -> Result<Vec<PluginId>> {
        let id = self.identify(name)?;
        Ok(self.graph.edges_to(&id).iter().cloned().collect())
    }

    /// Load a plugin. Returns the existing module if it is already loaded.
    ///
    /// If setup fails, the finalizers it managed to register run right
    /// away and the plugin stays unloaded.
    pub async fn load(&mut self, name: &str) -> Result<Arc<Module>> {
        let id = self.identify(name)?;
        self.load_id(id).await
    }

    /// Finalize and unload a single plugin, ignoring its dependents.
    ///
    /// Plugins depending on it keep references to a module that is gone;
    /// use [`PluginManager::unload`] unless you know there are none.
    pub fn unsafe_unload(&mut self, name: &str) -> Result<()> {
        let id = self.identify(name)?;
        let dependents = self.graph.edges_to(&id).len();
        if dependents > 0 {
            warn!(plugin = %id, dependents, "unsafe unload of a plugin others depend on");
        }
        self.unload_one(&id)
    }

    /// Unload a plugin and everything that transitively depends on it,
    /// dependents first.
    pub fn unload(&mut self, name: &str) -> Result<()> {
        let id = self.identify(name)?;
        let _span = info_span!("unload", plugin = %id).entered();

        let affected = self.graph.subgraph_paths_to(&id);
        let mut errors = ErrorCollector::new();
        for dep in affected.topo_sort_fwd() {
            if dep != &id {
                errors.record(self.unload_one(dep));
            }
        }
        errors.record(self.unload_one(&id));
        errors.finish()
    }

    /// Finalize and re-run one plugin's setup in place, ignoring its
    /// dependents. If the new setup fails the previous module stays
    /// registered, with its finalizers already drained.
    pub async fn unsafe_reload(&mut self, name: &str) -> Result<Arc<Module>> {
        let id = self.identify(name)?;
        let span = info_span!("unsafe_reload", plugin = %id);

        async move {
            let mut errors = ErrorCollector::new();
            errors.record(self.finalizers.finalize(&id));
            self.graph.del_edges_from(&id);

            if !self.host.is_loaded(id.as_str()) {
                return Err(errors.fail(Error::NotLoaded(id.to_string())));
            }

            let module = errors.record(self.setup(id.clone()).await);
            errors.finish()?;
            module.ok_or_else(|| Error::Internal(format!("{} reloaded without a module", id)))
        }
        .instrument(span)
        .await
    }

    /// Reload a plugin and everything that transitively depends on it.
    ///
    /// Dependents are unloaded first, then `name` is reloaded, then each
    /// dependent is reloaded in dependency order provided it was unloaded
    /// cleanly and all its dependencies came back. Anything whose
    /// prerequisite failed is left unloaded. Returns the new module.
    pub async fn reload(&mut self, name: &str) -> Result<Arc<Module>> {
        let id = self.identify(name)?;
        let span = info_span!("reload", plugin = %id);
        self.reload_id(id).instrument(span).await
    }

    /// Unload every loaded plugin, dependents before dependencies.
    ///
    /// This is the exit hook; `Drop` calls it when `teardown_on_drop` is
    /// set.
    pub fn shutdown(&mut self) -> Result<()> {
        let _span = info_span!("shutdown", loaded = self.host.len()).entered();

        let mut order: Vec<PluginId> = self.graph.topo_sort_fwd().cloned().collect();
        for id in self.host.loaded_ids() {
            if !self.graph.contains(&id) {
                order.push(id);
            }
        }

        let mut errors = ErrorCollector::new();
        for id in order {
            if self.host.is_loaded(id.as_str()) {
                errors.record(self.unload_one(&id));
            } else {
                self.graph.del_edges_from(&id);
            }
        }
        info!(failures = errors.len(), "plugin teardown finished");
        errors.finish()
    }

    /// Resolve an import made by the current plugin.
    pub(crate) async fn import(&mut self, name: &str) -> Result<Arc<Module>> {
        let target = self.identify(name)?;
        let targets: Vec<PluginId> = self
            .namespace
            .prefixes(name)
            .into_iter()
            .filter(|p| p == &target || self.host.knows(p))
            .collect();
        self.tracker.record_import(&mut self.graph, &targets)?;

        let mut module = None;
        for prefix in targets {
            module = Some(self.load_id(prefix).await?);
        }
        module.ok_or(Error::PluginNotFound(target.to_string()))
    }

    fn load_id(&mut self, id: PluginId) -> BoxFuture<'_, Result<Arc<Module>>> {
        Box::pin(async move {
            if let Some(module) = self.host.get(id.as_str()) {
                return Ok(module.clone());
            }
            self.setup(id).await
        })
    }

    /// Run `id`'s setup and register the result. A panicking setup is
    /// treated like one that returned an error.
    async fn setup(&mut self, id: PluginId) -> Result<Arc<Module>> {
        if self.tracker.is_initializing(id.as_str()) {
            return Err(Error::CircularImport {
                plugin: id.to_string(),
                chain: self.tracker.chain(),
            });
        }
        let plugin = self.host.resolve(&id)?;

        let outcome = {
            let span = info_span!("setup", plugin = %id);
            let mut ctx = SetupContext::enter(self, id.clone());
            let caught = AssertUnwindSafe(plugin.setup(&mut ctx).instrument(span))
                .catch_unwind()
                .await;
            caught.unwrap_or_else(|payload| {
                Err(Error::SetupPanicked {
                    plugin: id.to_string(),
                    message: panic_message(payload.as_ref()),
                })
            })
        };

        match outcome {
            Ok(exports) => {
                let module = self.host.insert(id.clone(), exports);
                info!(
                    plugin = %id,
                    generation = module.generation(),
                    dependencies = self.graph.edges_from(&id).len(),
                    "plugin loaded"
                );
                Ok(module)
            }
            Err(err) => {
                warn!(plugin = %id, error = %err, "plugin setup failed");
                let cleanup = self.finalizers.finalize(&id);
                self.graph.del_edges_from(&id);
                match cleanup {
                    Ok(()) => Err(err),
                    Err(cleanup_err) => {
                        let mut errors = ErrorCollector::new();
                        errors.push(err);
                        Err(errors.fail(cleanup_err))
                    }
                }
            }
        }
    }

    async fn reload_id(&mut self, id: PluginId) -> Result<Arc<Module>> {
        let reloads = self.graph.subgraph_paths_to(&id);
        let mut errors = ErrorCollector::new();
        let mut unload_success: BTreeSet<PluginId> = BTreeSet::new();
        let mut reload_success: BTreeSet<PluginId> = BTreeSet::new();

        for dep in reloads.topo_sort_fwd() {
            if dep != &id && errors.record(self.unload_one(dep)).is_some() {
                unload_success.insert(dep.clone());
            }
        }

        let mut reloaded = None;
        if errors.record(self.unload_one(&id)).is_some() {
            reloaded = errors.record(self.load_id(id.clone()).await);
            if reloaded.is_some() {
                reload_success.insert(id.clone());
            }
        }

        for dep in reloads.topo_sort_bck() {
            if !unload_success.contains(dep) {
                continue;
            }
            let ready = reloads
                .edges_from(dep)
                .iter()
                .all(|m| reload_success.contains(m));
            if !ready {
                warn!(plugin = %dep, "not reloading, a dependency failed to come back");
                continue;
            }
            if errors.record(self.load_id(dep.clone()).await).is_some() {
                reload_success.insert(dep.clone());
            }
        }

        debug!(
            unloaded = unload_success.len(),
            reloaded = reload_success.len(),
            "reload pass finished"
        );
        errors.finish()?;
        reloaded.ok_or_else(|| Error::Internal(format!("{} reloaded without a module", id)))
    }

    /// Finalize, forget outgoing edges, drop from the registry.
    fn unload_one(&mut self, id: &PluginId) -> Result<()> {
        let finalized = self.finalizers.finalize(id);
        self.graph.del_edges_from(id);
        let removed = self.host.remove(id.as_str());

        let mut errors = ErrorCollector::new();
        errors.record(finalized);
        match removed {
            Some(module) => info!(plugin = %id, generation = module.generation(), "plugin unloaded"),
            None => errors.push(Error::NotLoaded(id.to_string())),
        }
        errors.finish()
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        if !self.config.teardown_on_drop || self.host.is_empty() {
            return;
        }
        if let Err(err) = self.shutdown() {
            error!(error = %err, "plugin teardown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::catalog::Catalog;
    use crate::plugin::fixtures::{events, events_with, new_log, EventLog, TestPlugin};
    use crate::plugin::interface::{exports, Exports, Plugin, PluginInfo};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn manager(plugins: Vec<TestPlugin>) -> (PluginManager, Arc<Catalog>) {
        let catalog = Arc::new(Catalog::new());
        for plugin in plugins {
            catalog.register(plugin).unwrap();
        }
        (PluginManager::with_loader(catalog.clone()), catalog)
    }

    /// a -> b (a imports b)
    fn pair(log: &EventLog) -> Vec<TestPlugin> {
        vec![
            TestPlugin::new("plugins.a", log).importing("plugins.b"),
            TestPlugin::new("plugins.b", log),
        ]
    }

    /// c -> b -> a
    fn chain(log: &EventLog) -> Vec<TestPlugin> {
        vec![
            TestPlugin::new("plugins.a", log),
            TestPlugin::new("plugins.b", log).importing("plugins.a"),
            TestPlugin::new("plugins.c", log).importing("plugins.b"),
        ]
    }

    #[tokio::test]
    async fn test_load_records_dependency() {
        let log = new_log();
        let (mut manager, _) = manager(pair(&log));

        manager.load("plugins.a").await.unwrap();

        assert!(manager.graph().has_edge("plugins.a", "plugins.b"));
        assert!(manager.is_loaded("plugins.a"));
        assert!(manager.is_loaded("plugins.b"));
        assert_eq!(events_with(&log, "setup"), vec!["setup:plugins.a", "setup:plugins.b"]);
    }

    #[tokio::test]
    async fn test_unload_dependency_unloads_dependent_first() {
        let log = new_log();
        let (mut manager, _) = manager(pair(&log));
        manager.load("plugins.a").await.unwrap();

        manager.unload("plugins.b").unwrap();

        assert_eq!(events_with(&log, "fin"), vec!["fin:plugins.a:0", "fin:plugins.b:0"]);
        assert!(manager.loaded_plugins().is_empty());
        assert!(manager.graph().is_empty());

        manager.load("plugins.b").await.unwrap();
        assert!(manager.dependents("plugins.b").unwrap().is_empty());
        assert!(!manager.is_loaded("plugins.a"));
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let log = new_log();
        let (mut manager, _) = manager(pair(&log));

        let first = manager.load("plugins.a").await.unwrap();
        let edges = manager.graph().edge_count();
        let second = manager.load("plugins.a").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.graph().edge_count(), edges);
        assert_eq!(events_with(&log, "setup:plugins.a").len(), 1);
    }

    #[tokio::test]
    async fn test_exports_visible_to_importer() {
        let log = new_log();
        let (mut manager, _) = manager(pair(&log));
        manager.load("plugins.a").await.unwrap();

        let b = manager.get("plugins.b").unwrap();
        assert_eq!(b.exports::<String>().unwrap().as_str(), "plugins.b");
        assert_eq!(b.id().as_str(), "plugins.b");
    }

    #[tokio::test]
    async fn test_failing_finalizer_does_not_skip_rest() {
        let log = new_log();
        let (mut manager, _) = manager(vec![TestPlugin::new("plugins.p", &log)
            .with_finalizers(3)
            .failing_finalizer(0)]);
        manager.load("plugins.p").await.unwrap();

        let err = manager.unload("plugins.p").unwrap_err();

        assert_eq!(
            events_with(&log, "fin"),
            vec!["fin:plugins.p:0", "fin:plugins.p:1", "fin:plugins.p:2"]
        );
        assert!(matches!(err, Error::FinalizerFailed { ref plugin, index: 0, .. } if plugin == "plugins.p"));
        assert!(!manager.is_loaded("plugins.p"));
    }

    #[tokio::test]
    async fn test_unload_continues_past_failures() {
        let log = new_log();
        let (mut manager, _) = manager(vec![
            TestPlugin::new("plugins.a", &log),
            TestPlugin::new("plugins.b", &log)
                .importing("plugins.a")
                .failing_finalizer(0),
            TestPlugin::new("plugins.c", &log)
                .importing("plugins.a")
                .failing_finalizer(0),
        ]);
        manager.load("plugins.b").await.unwrap();
        manager.load("plugins.c").await.unwrap();

        let err = manager.unload("plugins.a").unwrap_err();

        assert_eq!(err.errors().count(), 2);
        assert_eq!(events_with(&log, "fin").len(), 3);
        assert_eq!(events_with(&log, "fin").last().unwrap(), "fin:plugins.a:0");
        assert!(manager.loaded_plugins().is_empty());
    }

    #[tokio::test]
    async fn test_failed_setup_runs_finalizers() {
        let log = new_log();
        let (mut manager, _) = manager(vec![
            TestPlugin::new("plugins.bad", &log)
                .importing("plugins.dep")
                .with_finalizers(2)
                .failing_setup(),
            TestPlugin::new("plugins.dep", &log),
        ]);

        let err = manager.load("plugins.bad").await.unwrap_err();

        assert!(matches!(err, Error::SetupFailed(_)));
        assert_eq!(
            events_with(&log, "fin"),
            vec!["fin:plugins.bad:0", "fin:plugins.bad:1"]
        );
        assert_eq!(manager.state("plugins.bad").unwrap(), PluginState::NotLoaded);
        assert!(manager.dependencies("plugins.bad").unwrap().is_empty());
        // the dependency itself loaded fine and stays
        assert!(manager.is_loaded("plugins.dep"));
        assert!(manager.current_plugin().is_err());
    }

    #[tokio::test]
    async fn test_failed_setup_with_failing_finalizer() {
        let log = new_log();
        let (mut manager, _) = manager(vec![TestPlugin::new("plugins.bad", &log)
            .failing_finalizer(0)
            .failing_setup()]);

        let err = manager.load("plugins.bad").await.unwrap_err();
        let errors: Vec<&Error> = err.errors().collect();

        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], Error::SetupFailed(_)));
        assert!(matches!(errors[1], Error::FinalizerFailed { .. }));
    }

    #[tokio::test]
    async fn test_nested_failure_propagates() {
        let log = new_log();
        let (mut manager, _) = manager(vec![
            TestPlugin::new("plugins.a", &log).importing("plugins.b"),
            TestPlugin::new("plugins.b", &log).failing_setup(),
        ]);

        let err = manager.load("plugins.a").await.unwrap_err();

        assert!(matches!(err, Error::SetupFailed(ref msg) if msg.contains("plugins.b")));
        assert!(manager.loaded_plugins().is_empty());
        assert!(manager.graph().is_empty());
        // a failed at the import, before registering anything
        assert_eq!(events_with(&log, "fin"), vec!["fin:plugins.b:0"]);
    }

    struct Inspector {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Plugin for Inspector {
        fn info(&self) -> PluginInfo {
            PluginInfo::new("plugins.inspector", "Inspector", "1.0.0")
        }

        async fn setup(&self, ctx: &mut SetupContext<'_>) -> Result<Exports> {
            let line = format!(
                "{:?} {} {} {}",
                ctx.state("plugins.inspector")?,
                ctx.current_plugin()?,
                ctx.plugin().short_name(),
                ctx.namespace().root()
            );
            self.seen.lock().unwrap().push(line);
            Ok(exports(()))
        }
    }

    #[tokio::test]
    async fn test_setup_context_view() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let catalog = Catalog::new();
        catalog.register(Inspector { seen: seen.clone() }).unwrap();
        let mut manager = PluginManager::with_loader(catalog);

        manager.load("plugins.inspector").await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["Loading plugins.inspector inspector plugins"]);
        assert_eq!(manager.state("plugins.inspector").unwrap(), PluginState::Loaded);
        assert_eq!(manager.get("plugins.inspector").unwrap().generation(), 1);
    }

    #[tokio::test]
    async fn test_panicking_setup_cleans_up() {
        let log = new_log();
        let (mut manager, catalog) = manager(vec![
            TestPlugin::new("plugins.p", &log)
                .importing("plugins.dep")
                .panicking_setup(),
            TestPlugin::new("plugins.dep", &log),
        ]);

        let err = manager.load("plugins.p").await.unwrap_err();

        match err {
            Error::SetupPanicked { plugin, message } => {
                assert_eq!(plugin, "plugins.p");
                assert_eq!(message, "plugins.p exploded");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(events_with(&log, "fin"), vec!["fin:plugins.p:0"]);
        assert!(!manager.is_loaded("plugins.p"));
        assert!(manager.is_loaded("plugins.dep"));
        assert!(!manager.graph().has_edge("plugins.p", "plugins.dep"));
        assert!(manager.current_plugin().is_err());

        // Next lifecycle starts from a clean slate
        catalog.replace(TestPlugin::new("plugins.p", &log).importing("plugins.dep"));
        manager.load("plugins.p").await.unwrap();
        manager.unsafe_unload("plugins.p").unwrap();
        assert_eq!(events_with(&log, "fin:plugins.p").len(), 2);
    }

    #[tokio::test]
    async fn test_usage_errors() {
        let (mut manager, _) = manager(Vec::new());

        assert!(matches!(manager.load("util.digraph").await, Err(Error::NotAPlugin(_))));
        assert!(matches!(manager.unload("discord_client"), Err(Error::NotAPlugin(_))));
        assert!(matches!(manager.reload("main").await, Err(Error::NotAPlugin(_))));
        assert!(matches!(manager.current_plugin(), Err(Error::NotInitializing)));
        assert!(matches!(
            manager.register_finalizer(|| Ok(())),
            Err(Error::NotInitializing)
        ));
        assert!(matches!(
            manager.load("plugins.missing").await,
            Err(Error::PluginNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unload_not_loaded() {
        let (mut manager, _) = manager(vec![TestPlugin::new("plugins.a", &new_log())]);
        assert!(matches!(manager.unload("plugins.a"), Err(Error::NotLoaded(_))));
    }

    #[tokio::test]
    async fn test_package_prefixes_become_dependencies() {
        let log = new_log();
        let (mut manager, _) = manager(vec![
            TestPlugin::new("plugins.app", &log).importing("plugins.commands.args"),
            TestPlugin::new("plugins.commands", &log),
            TestPlugin::new("plugins.commands.args", &log),
        ]);

        manager.load("plugins.app").await.unwrap();

        let deps: Vec<String> = manager
            .dependencies("plugins.app")
            .unwrap()
            .into_iter()
            .map(|d| d.to_string())
            .collect();
        assert_eq!(deps, vec!["plugins.commands", "plugins.commands.args"]);
        assert_eq!(
            events_with(&log, "setup"),
            vec![
                "setup:plugins.app",
                "setup:plugins.commands",
                "setup:plugins.commands.args"
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_package_prefix_skipped() {
        let log = new_log();
        let (mut manager, _) = manager(vec![
            TestPlugin::new("plugins.app", &log).importing("plugins.ns.leaf"),
            TestPlugin::new("plugins.ns.leaf", &log),
        ]);

        manager.load("plugins.app").await.unwrap();

        let deps = manager.dependencies("plugins.app").unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].as_str(), "plugins.ns.leaf");
    }

    #[tokio::test]
    async fn test_circular_import() {
        let log = new_log();
        let (mut manager, _) = manager(vec![
            TestPlugin::new("plugins.a", &log).importing("plugins.b"),
            TestPlugin::new("plugins.b", &log).importing("plugins.a"),
        ]);

        let err = manager.load("plugins.a").await.unwrap_err();

        match err {
            Error::CircularImport { plugin, chain } => {
                assert_eq!(plugin, "plugins.a");
                assert_eq!(chain, "plugins.a -> plugins.b");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(manager.loaded_plugins().is_empty());
        assert!(manager.graph().is_empty());
    }

    #[tokio::test]
    async fn test_reload_cascades_in_dependency_order() {
        let log = new_log();
        let (mut manager, _) = manager(chain(&log));
        manager.load("plugins.c").await.unwrap();
        let old_a = manager.get("plugins.a").unwrap();
        log.lock().unwrap().clear();

        let new_a = manager.reload("plugins.a").await.unwrap();

        assert_eq!(new_a.generation(), old_a.generation() + 1);
        assert_eq!(
            events(&log),
            vec![
                "fin:plugins.c:0",
                "fin:plugins.b:0",
                "fin:plugins.a:0",
                "setup:plugins.a",
                "setup:plugins.b",
                "setup:plugins.c",
            ]
        );
        assert!(manager.graph().has_edge("plugins.c", "plugins.b"));
        assert!(manager.graph().has_edge("plugins.b", "plugins.a"));
    }

    #[tokio::test]
    async fn test_reload_skips_dependents_of_failed_reload() {
        let log = new_log();
        let (mut manager, catalog) = manager(chain(&log));
        manager.load("plugins.c").await.unwrap();

        catalog.replace(
            TestPlugin::new("plugins.b", &log)
                .importing("plugins.a")
                .failing_setup(),
        );
        let err = manager.reload("plugins.a").await.unwrap_err();

        let errors: Vec<&Error> = err.errors().collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], Error::SetupFailed(msg) if msg.contains("plugins.b")));
        assert!(manager.is_loaded("plugins.a"));
        assert!(!manager.is_loaded("plugins.b"));
        assert!(!manager.is_loaded("plugins.c"));
        assert_eq!(events_with(&log, "setup:plugins.c").len(), 1);
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_code() {
        let log = new_log();
        let (mut manager, catalog) = manager(vec![TestPlugin::new("plugins.a", &log)]);
        manager.load("plugins.a").await.unwrap();

        catalog.replace(TestPlugin::new("plugins.a", &log).with_finalizers(2));
        manager.reload("plugins.a").await.unwrap();
        manager.unload("plugins.a").unwrap();

        assert_eq!(
            events_with(&log, "fin"),
            vec!["fin:plugins.a:0", "fin:plugins.a:0", "fin:plugins.a:1"]
        );
    }

    #[tokio::test]
    async fn test_reload_with_failing_dependent_finalizer() {
        let log = new_log();
        let (mut manager, _) = manager(vec![
            TestPlugin::new("plugins.a", &log),
            TestPlugin::new("plugins.b", &log)
                .importing("plugins.a")
                .failing_finalizer(0),
        ]);
        manager.load("plugins.b").await.unwrap();

        let err = manager.reload("plugins.a").await.unwrap_err();

        assert!(matches!(err, Error::FinalizerFailed { .. }));
        // b was removed but its unload failed, so it is not brought back
        assert!(manager.is_loaded("plugins.a"));
        assert!(!manager.is_loaded("plugins.b"));
    }

    #[tokio::test]
    async fn test_reload_not_loaded() {
        let (mut manager, _) = manager(vec![TestPlugin::new("plugins.a", &new_log())]);
        assert!(matches!(manager.reload("plugins.a").await, Err(Error::NotLoaded(_))));
        assert!(!manager.is_loaded("plugins.a"));
    }

    #[tokio::test]
    async fn test_unsafe_reload_keeps_dependents() {
        let log = new_log();
        let (mut manager, _) = manager(pair(&log));
        manager.load("plugins.a").await.unwrap();

        let b = manager.unsafe_reload("plugins.b").await.unwrap();

        assert_eq!(b.generation(), 2);
        assert!(manager.is_loaded("plugins.a"));
        assert_eq!(events_with(&log, "fin"), vec!["fin:plugins.b:0"]);
    }

    #[tokio::test]
    async fn test_unsafe_reload_failure_keeps_old_module() {
        let log = new_log();
        let (mut manager, catalog) = manager(vec![TestPlugin::new("plugins.a", &log)]);
        let old = manager.load("plugins.a").await.unwrap();

        catalog.replace(TestPlugin::new("plugins.a", &log).failing_setup());
        let err = manager.unsafe_reload("plugins.a").await.unwrap_err();

        assert!(matches!(err, Error::SetupFailed(_)));
        assert!(Arc::ptr_eq(&old, &manager.get("plugins.a").unwrap()));
    }

    #[tokio::test]
    async fn test_unsafe_unload_ignores_dependents() {
        let log = new_log();
        let (mut manager, _) = manager(pair(&log));
        manager.load("plugins.a").await.unwrap();

        manager.unsafe_unload("plugins.b").unwrap();

        assert!(manager.is_loaded("plugins.a"));
        assert!(!manager.is_loaded("plugins.b"));
        assert_eq!(events_with(&log, "fin"), vec!["fin:plugins.b:0"]);
    }

    #[tokio::test]
    async fn test_shutdown_unloads_everything() {
        let log = new_log();
        let mut plugins = chain(&log);
        plugins.push(TestPlugin::new("plugins.solo", &log));
        let (mut manager, _) = manager(plugins);
        manager.load("plugins.c").await.unwrap();
        manager.load("plugins.solo").await.unwrap();

        manager.shutdown().unwrap();

        assert_eq!(
            events_with(&log, "fin"),
            vec![
                "fin:plugins.c:0",
                "fin:plugins.b:0",
                "fin:plugins.a:0",
                "fin:plugins.solo:0"
            ]
        );
        assert!(manager.loaded_plugins().is_empty());
        assert!(manager.graph().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_continues_past_failures() {
        let log = new_log();
        let (mut manager, _) = manager(vec![
            TestPlugin::new("plugins.a", &log).failing_finalizer(0),
            TestPlugin::new("plugins.b", &log)
                .importing("plugins.a")
                .failing_finalizer(0),
            TestPlugin::new("plugins.c", &log).importing("plugins.b"),
        ]);
        manager.load("plugins.c").await.unwrap();

        let err = manager.shutdown().unwrap_err();

        assert_eq!(
            events_with(&log, "fin"),
            vec!["fin:plugins.c:0", "fin:plugins.b:0", "fin:plugins.a:0"]
        );
        let failed: Vec<&str> = err
            .errors()
            .map(|e| match e {
                Error::FinalizerFailed { plugin, .. } => plugin.as_str(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(failed, vec!["plugins.b", "plugins.a"]);
        assert!(matches!(err, Error::Aggregate(ref agg) if agg.len() == 2));
        assert!(manager.loaded_plugins().is_empty());
        assert!(manager.graph().is_empty());
    }

    #[tokio::test]
    async fn test_drop_runs_teardown() {
        let log = new_log();
        {
            let (mut manager, _) = manager(pair(&log));
            manager.load("plugins.a").await.unwrap();
        }
        assert_eq!(events_with(&log, "fin"), vec!["fin:plugins.a:0", "fin:plugins.b:0"]);
    }

    #[tokio::test]
    async fn test_drop_without_teardown() {
        let log = new_log();
        let catalog = Catalog::new();
        catalog.register(TestPlugin::new("plugins.a", &log)).unwrap();
        {
            let config = ManagerConfig::default().without_teardown();
            let mut manager = PluginManager::new(config, catalog).unwrap();
            manager.load("plugins.a").await.unwrap();
        }
        assert!(events_with(&log, "fin").is_empty());
    }

    #[tokio::test]
    async fn test_custom_namespace() {
        let log = new_log();
        let catalog = Catalog::new();
        catalog.register(TestPlugin::new("ext.a", &log)).unwrap();
        let config = ManagerConfig::with_namespace("ext");
        let mut manager = PluginManager::new(config, catalog).unwrap();

        manager.load("ext.a").await.unwrap();
        assert!(matches!(manager.load("plugins.a").await, Err(Error::NotAPlugin(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ManagerConfig::with_namespace("ext").with_autoload("plugins.main");
        assert!(PluginManager::new(config, Catalog::new()).is_err());
    }
}
