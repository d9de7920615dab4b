//! Service loop.
//!
//! Loads the configured autoload plugin, then serves lifecycle commands
//! (load, unload, reload) one at a time until a shutdown signal arrives,
//! and finally tears every plugin down.

use crate::core::{Error, ErrorCollector, ManagerConfig, Result};
use crate::monitoring::init_logging;
use crate::plugin::{Module, PluginLoader, PluginManager};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// A lifecycle request sent to a running service.
#[derive(Debug)]
pub enum Command {
    /// Load a plugin
    Load {
        name: String,
        reply: oneshot::Sender<Result<Arc<Module>>>,
    },
    /// Unload a plugin and its dependents
    Unload {
        name: String,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Reload a plugin and its dependents
    Reload {
        name: String,
        reply: oneshot::Sender<Result<Arc<Module>>>,
    },
}

impl Command {
    fn name(&self) -> &str {
        match self {
            Command::Load { name, .. }
            | Command::Unload { name, .. }
            | Command::Reload { name, .. } => name,
        }
    }
}

/// Client side of a running service.
#[derive(Clone, Debug)]
pub struct ManagerHandle {
    tx: mpsc::Sender<Command>,
}

impl ManagerHandle {
    /// Load `name` in the running service.
    pub async fn load(&self, name: &str) -> Result<Arc<Module>> {
        let (reply, rx) = oneshot::channel();
        self.call(Command::Load { name: name.to_string(), reply }, rx).await
    }

    /// Unload `name` and its dependents in the running service.
    pub async fn unload(&self, name: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.call(Command::Unload { name: name.to_string(), reply }, rx).await
    }

    /// Reload `name` and its dependents in the running service.
    pub async fn reload(&self, name: &str) -> Result<Arc<Module>> {
        let (reply, rx) = oneshot::channel();
        self.call(Command::Reload { name: name.to_string(), reply }, rx).await
    }

    /// Whether the service stopped accepting commands.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn call<T>(&self, command: Command, rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        self.tx.send(command).await.map_err(|_| Error::ServiceStopped)?;
        rx.await.map_err(|_| Error::ServiceStopped)?
    }
}

/// Create a command channel holding up to `buffer` pending requests.
pub fn channel(buffer: usize) -> (ManagerHandle, mpsc::Receiver<Command>) {
    let (tx, rx) = mpsc::channel(buffer);
    (ManagerHandle { tx }, rx)
}

/// Run `manager` until `shutdown` resolves, serving `commands` meanwhile.
///
/// Commands are handled one at a time, in arrival order. A failing
/// autoload does not keep the service alive: whatever it left loaded is
/// torn down and all failures are returned together.
pub async fn run<F>(
    manager: &mut PluginManager,
    mut commands: mpsc::Receiver<Command>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    if let Some(name) = manager.config().autoload.clone() {
        info!(plugin = %name, "autoloading");
        if let Err(err) = manager.load(&name).await {
            error!(plugin = %name, error = %err, "autoload failed");
            let mut errors = ErrorCollector::new();
            errors.push(err);
            errors.record(manager.shutdown());
            return errors.finish();
        }
    }

    info!(loaded = manager.loaded_plugins().len(), "plugins running");
    tokio::pin!(shutdown);
    let mut accepting = true;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            command = commands.recv(), if accepting => match command {
                Some(command) => dispatch(manager, command).await,
                None => {
                    debug!("all command handles dropped");
                    accepting = false;
                }
            },
        }
    }
    info!("shutdown requested");
    commands.close();

    manager.shutdown()
}

async fn dispatch(manager: &mut PluginManager, command: Command) {
    debug!(plugin = command.name(), "lifecycle command");
    let delivered = match command {
        Command::Load { name, reply } => reply.send(manager.load(&name).await).is_ok(),
        Command::Unload { name, reply } => reply.send(manager.unload(&name)).is_ok(),
        Command::Reload { name, reply } => reply.send(manager.reload(&name).await).is_ok(),
    };
    if !delivered {
        debug!("requester went away before the reply");
    }
}

/// Install logging from `config`, build a manager over `loader` and run it
/// until `shutdown` resolves.
pub async fn serve<F>(
    config: ManagerConfig,
    loader: impl PluginLoader + 'static,
    commands: mpsc::Receiver<Command>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    init_logging(&config.logging);
    let mut manager = PluginManager::new(config, loader)?;
    run(&mut manager, commands, shutdown).await
}

/// Resolves on Ctrl-C.
pub async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for ctrl-c");
    }
}
