//! Core utilities and common types for hotload.

pub mod config;
pub mod error;
pub mod types;

pub use config::ManagerConfig;
pub use error::{AggregateError, Error, ErrorCollector, Result};
pub use types::*;
