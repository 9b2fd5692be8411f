//! Loglens core -- shared domain types, errors, configuration and metric names.
//!
//! # Modules
//!
//! - [`config`]: `loglens.toml` parsing with environment overrides
//! - [`error`]: top-level error hierarchy
//! - [`metrics`]: metric name constants
//! - [`types`]: persisted domain entities (service keys, checkpoints, forwarder configs)

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- re-exports ---

pub use config::LoglensConfig;
pub use error::{ConfigError, LoglensError, StoreError};
pub use pipeline::BoxFuture;
pub use types::{
    ButtonState, Checkpoint, ForwarderConfig, ModelAssociation, ProcessingMode, Protocol,
    ServiceKey, SourceKind, source_basename,
};
