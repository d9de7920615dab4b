//! Configurable plugins for unit tests.

use crate::core::{Error, Result};
use crate::plugin::context::SetupContext;
use crate::plugin::interface::{exports, Exports, Plugin, PluginInfo};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Shared event log: `setup:<id>`, `fin:<id>:<n>`.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Events starting with `prefix`.
pub fn events_with(log: &EventLog, prefix: &str) -> Vec<String> {
    events(log)
        .into_iter()
        .filter(|e| e.starts_with(prefix))
        .collect()
}

/// Plugin that imports, registers finalizers and fails as told.
#[derive(Clone)]
pub struct TestPlugin {
    id: String,
    imports: Vec<String>,
    finalizers: usize,
    failing_finalizers: Vec<usize>,
    fail_setup: bool,
    panic_setup: bool,
    log: EventLog,
}

impl TestPlugin {
    pub fn new(id: &str, log: &EventLog) -> Self {
        Self {
            id: id.to_string(),
            imports: Vec::new(),
            finalizers: 1,
            failing_finalizers: Vec::new(),
            fail_setup: false,
            panic_setup: false,
            log: log.clone(),
        }
    }

    pub fn importing(mut self, name: &str) -> Self {
        self.imports.push(name.to_string());
        self
    }

    pub fn with_finalizers(mut self, count: usize) -> Self {
        self.finalizers = count;
        self
    }

    pub fn failing_finalizer(mut self, index: usize) -> Self {
        self.failing_finalizers.push(index);
        self
    }

    /// Fail after imports and finalizer registration.
    pub fn failing_setup(mut self) -> Self {
        self.fail_setup = true;
        self
    }

    /// Panic after imports and finalizer registration.
    pub fn panicking_setup(mut self) -> Self {
        self.panic_setup = true;
        self
    }
}

#[async_trait]
impl Plugin for TestPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(&self.id, &self.id, "1.0.0")
    }

    async fn setup(&self, ctx: &mut SetupContext<'_>) -> Result<Exports> {
        self.log.lock().unwrap().push(format!("setup:{}", self.id));

        for name in &self.imports {
            ctx.import(name).await?;
        }

        for n in 0..self.finalizers {
            let log = self.log.clone();
            let tag = format!("fin:{}:{}", self.id, n);
            let fail = self.failing_finalizers.contains(&n);
            ctx.register_finalizer(move || {
                log.lock().unwrap().push(tag.clone());
                if fail {
                    Err(Error::setup(format!("{} broke", tag)))
                } else {
                    Ok(())
                }
            })?;
        }

        if self.panic_setup {
            panic!("{} exploded", self.id);
        }
        if self.fail_setup {
            return Err(Error::setup(format!("{} setup failed", self.id)));
        }
        Ok(exports(self.id.clone()))
    }
}
