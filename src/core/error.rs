//! Error types for hotload.

use std::fmt;
use thiserror::Error;

/// Result type alias for hotload operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in hotload operations.
#[derive(Error, Debug)]
pub enum Error {
    // Usage errors
    #[error("{0} is not a plugin")]
    NotAPlugin(String),

    #[error("not called during plugin initialization")]
    NotInitializing,

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Plugin not loaded: {0}")]
    NotLoaded(String),

    #[error("Plugin {0} is already registered")]
    DuplicatePlugin(String),

    #[error("Circular import of {plugin} (initialization chain: {chain})")]
    CircularImport { plugin: String, chain: String },

    // Plugin-authored failures
    #[error("Plugin setup failed: {0}")]
    SetupFailed(String),

    #[error("Setup of {plugin} panicked: {message}")]
    SetupPanicked { plugin: String, message: String },

    #[error("Finalizer #{index} of {plugin} failed: {source}")]
    FinalizerFailed {
        plugin: String,
        index: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("Finalizer #{index} of {plugin} panicked: {message}")]
    FinalizerPanicked {
        plugin: String,
        index: usize,
        message: String,
    },

    #[error("{0}")]
    Aggregate(AggregateError),

    #[error("Plugin service is not running")]
    ServiceStopped,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a plugin setup failure.
    pub fn setup(message: impl Into<String>) -> Self {
        Error::SetupFailed(message.into())
    }

    /// Whether this is a caller mistake rather than a plugin failure.
    ///
    /// Usage errors fail immediately and are never aggregated by a batch.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::NotAPlugin(_)
                | Error::NotInitializing
                | Error::PluginNotFound(_)
                | Error::DuplicatePlugin(_)
        )
    }

    /// Iterate the leaf errors. An aggregate yields its members, anything
    /// else yields itself.
    pub fn errors(&self) -> Box<dyn Iterator<Item = &Error> + '_> {
        match self {
            Error::Aggregate(agg) => Box::new(agg.iter()),
            other => Box::new(std::iter::once(other)),
        }
    }

    /// Consume into the leaf errors.
    pub fn into_errors(self) -> Vec<Error> {
        match self {
            Error::Aggregate(agg) => agg.errors,
            other => vec![other],
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

/// Several failures collected during one best-effort batch.
#[derive(Debug)]
pub struct AggregateError {
    errors: Vec<Error>,
}

impl AggregateError {
    /// Number of collected failures.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterate collected failures in the order they happened.
    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.errors.iter()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred", self.errors.len())?;
        for (i, err) in self.errors.iter().enumerate() {
            write!(f, "\n  [{}] {}", i + 1, err)?;
        }
        Ok(())
    }
}

/// Accumulates failures of independent units of work.
///
/// Each unit runs regardless of earlier failures; `finish` reports
/// everything at once.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Vec<Error>,
}

impl ErrorCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Keep the value of a successful unit, remember the failure otherwise.
    pub fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.push(err);
                None
            }
        }
    }

    /// Remember a failure. Nested aggregates are flattened.
    pub fn push(&mut self, err: Error) {
        match err {
            Error::Aggregate(agg) => self.errors.extend(agg.errors),
            other => self.errors.push(other),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// `Ok` when nothing failed, the lone error when one did, an aggregate
    /// otherwise.
    pub fn finish(self) -> Result<()> {
        match self.into_error() {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Like `finish`, without the `Result` wrapper.
    pub fn into_error(self) -> Option<Error> {
        if self.errors.is_empty() {
            None
        } else {
            Some(combine(self.errors))
        }
    }

    /// Add a final failure and return everything collected.
    pub fn fail(mut self, err: Error) -> Error {
        self.push(err);
        combine(self.errors)
    }
}

fn combine(mut errors: Vec<Error>) -> Error {
    if errors.len() == 1 {
        errors.remove(0)
    } else {
        Error::Aggregate(AggregateError { errors })
    }
}
