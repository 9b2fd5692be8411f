//! Loglens agent -- the monitoring and reconciliation engine.
//!
//! Turns persisted desired state ("this source + template is enabled and
//! started") into live monitor tasks that tail, classify, transform and
//! forward log records.
//!
//! # Architecture
//!
//! ```text
//! Reconciler ──▶ ServiceRegistry ──▶ MonitorTask (one per service)
//!                                     │
//!                                     ├─ TextReader / EventLogReader
//!                                     ├─ classifier::matches
//!                                     ├─ Transformer ──▶ InferenceBackend
//!                                     ├─ Forwarder (TCP/UDP)
//!                                     └─ StateStore (checkpoints, counters)
//! ```
//!
//! # Modules
//! - [`config`]: runtime settings derived from `loglens.toml`
//! - [`store`]: persisted JSON documents
//! - [`template`]: template loading and classification
//! - [`transform`]: inference and output format conversion
//! - [`source`]: text and event log readers
//! - [`forwarder`]: payload delivery
//! - [`monitor`]: per-service task loop
//! - [`registry`]: live task map
//! - [`reconcile`]: desired-state reconciliation

pub mod config;
pub mod error;
pub mod forwarder;
pub mod monitor;
pub mod reconcile;
pub mod registry;
pub mod source;
pub mod store;
pub mod template;
pub mod transform;

pub use config::AgentConfig;
pub use error::AgentError;
pub use forwarder::Forwarder;
pub use monitor::{MonitorContext, MonitorSpec, MonitorTask, TaskMode};
pub use reconcile::{ReconcileReport, Reconciler};
pub use registry::{ServiceRegistry, StartOutcome};
pub use source::{EventLogReader, EvtxFileReader};
pub use store::StateStore;
pub use template::{Template, TemplateCatalog};
pub use transform::{
    DisabledBackend, InferenceBackend, LlamaServerBackend, TransformOutcome, Transformer,
};
