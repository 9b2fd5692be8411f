//! Persisted configuration and progress documents
//!
//! [`StateStore`] groups every JSON document the engine reads or writes
//! under `data_dir`:
//!
//! | File | Content |
//! |---|---|
//! | `saved_paths.json` | ordered list of monitored source paths |
//! | `mapping.json` | source path → template names |
//! | `modelsmap.json` | template name → `[model, temperature, top_k, top_p]` |
//! | `button_states.json` | service key → `{enabled, started}` |
//! | `forwarder_defaults.json` | global forwarding destination |
//! | `forwarder_overrides.json` | source basename → forwarding destination |
//! | `checkpoints.json` | service key → resume position |
//! | `counters.json` | source basename → forwarded record count |
//!
//! The external configuration surface produces most of these; the engine
//! only writes checkpoints and counters during normal operation.

pub mod document;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use loglens_core::error::StoreError;
use loglens_core::types::{ButtonState, Checkpoint, ForwarderConfig, ModelAssociation, ServiceKey};

pub use document::JsonDocument;

/// Typed access to the persisted documents.
pub struct StateStore {
    dir: PathBuf,
    saved_paths: JsonDocument<Vec<String>>,
    mapping: JsonDocument<BTreeMap<String, Vec<String>>>,
    associations: JsonDocument<BTreeMap<String, ModelAssociation>>,
    button_states: JsonDocument<BTreeMap<String, ButtonState>>,
    forwarder_defaults: JsonDocument<ForwarderConfig>,
    forwarder_overrides: JsonDocument<BTreeMap<String, ForwarderConfig>>,
    // entries decode one by one so a single bad value only affects its own key
    checkpoints: JsonDocument<BTreeMap<String, Value>>,
    counters: JsonDocument<BTreeMap<String, u64>>,
}

impl StateStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            dir: dir.to_path_buf(),
            saved_paths: JsonDocument::new(dir, "saved_paths.json"),
            mapping: JsonDocument::new(dir, "mapping.json"),
            associations: JsonDocument::new(dir, "modelsmap.json"),
            button_states: JsonDocument::new(dir, "button_states.json"),
            forwarder_defaults: JsonDocument::new(dir, "forwarder_defaults.json"),
            forwarder_overrides: JsonDocument::new(dir, "forwarder_overrides.json"),
            checkpoints: JsonDocument::new(dir, "checkpoints.json"),
            counters: JsonDocument::new(dir, "counters.json"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // --- sources and templates ---

    pub async fn saved_paths(&self) -> Result<Vec<String>, StoreError> {
        self.saved_paths.load().await
    }

    /// Appends a path unless it is already saved.
    pub async fn add_saved_path(&self, path: &str) -> Result<(), StoreError> {
        self.saved_paths
            .update(|paths| {
                if !paths.iter().any(|p| p == path) {
                    paths.push(path.to_owned());
                }
            })
            .await
    }

    /// Removes a path together with its template assignments.
    pub async fn remove_saved_path(&self, path: &str) -> Result<(), StoreError> {
        self.saved_paths
            .update(|paths| paths.retain(|p| p != path))
            .await?;
        self.mapping
            .update(|mapping| {
                mapping.remove(path);
            })
            .await
    }

    /// Template names assigned to a source path.
    pub async fn templates_for(&self, path: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .mapping
            .load()
            .await?
            .remove(path)
            .unwrap_or_default())
    }

    pub async fn assign_template(&self, path: &str, template: &str) -> Result<(), StoreError> {
        self.mapping
            .update(|mapping| {
                let templates = mapping.entry(path.to_owned()).or_default();
                if !templates.iter().any(|t| t == template) {
                    templates.push(template.to_owned());
                }
            })
            .await
    }

    // --- model associations ---

    /// Model assigned to a template, `None` when no model is assigned.
    pub async fn association(&self, template: &str) -> Result<Option<ModelAssociation>, StoreError> {
        Ok(self.associations.load().await?.remove(template))
    }

    /// Assigns a model, or clears the assignment with `None`.
    pub async fn set_association(
        &self,
        template: &str,
        association: Option<ModelAssociation>,
    ) -> Result<(), StoreError> {
        self.associations
            .update(|map| match association {
                Some(assoc) => {
                    map.insert(template.to_owned(), assoc);
                }
                None => {
                    map.remove(template);
                }
            })
            .await
    }

    // --- desired state ---

    pub async fn button_states(&self) -> Result<BTreeMap<String, ButtonState>, StoreError> {
        self.button_states.load().await
    }

    /// Desired state of one service, `{enabled: false, started: false}` when absent.
    pub async fn button_state(&self, key: &ServiceKey) -> Result<ButtonState, StoreError> {
        Ok(self
            .button_states
            .load()
            .await?
            .get(&key.document_key())
            .copied()
            .unwrap_or_default())
    }

    pub async fn set_button_state(
        &self,
        key: &ServiceKey,
        state: ButtonState,
    ) -> Result<(), StoreError> {
        self.button_states
            .update(|map| {
                map.insert(key.document_key(), state);
            })
            .await
    }

    // --- forwarding ---

    /// Per-source override if present, otherwise the global default.
    pub async fn forwarder_for(&self, source: &str) -> Result<ForwarderConfig, StoreError> {
        if let Some(config) = self.forwarder_overrides.load().await?.remove(source) {
            return Ok(config);
        }
        self.forwarder_defaults.load().await
    }

    pub async fn set_forwarder_default(&self, config: &ForwarderConfig) -> Result<(), StoreError> {
        self.forwarder_defaults.save(config).await
    }

    /// Sets or clears (`None`) the override of one source basename.
    pub async fn set_forwarder_override(
        &self,
        source: &str,
        config: Option<ForwarderConfig>,
    ) -> Result<(), StoreError> {
        self.forwarder_overrides
            .update(|map| match config {
                Some(config) => {
                    map.insert(source.to_owned(), config);
                }
                None => {
                    map.remove(source);
                }
            })
            .await
    }

    // --- progress ---

    /// Resume position of `key`; an entry that does not decode reads as absent.
    pub async fn checkpoint(&self, key: &ServiceKey) -> Result<Option<Checkpoint>, StoreError> {
        let doc_key = key.document_key();
        let Some(raw) = self.checkpoints.load().await?.remove(&doc_key) else {
            return Ok(None);
        };
        match serde_json::from_value(raw) {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(e) => {
                warn!(service = %doc_key, error = %e, "ignoring undecodable checkpoint entry");
                Ok(None)
            }
        }
    }

    pub async fn save_checkpoint(
        &self,
        key: &ServiceKey,
        checkpoint: Checkpoint,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(&checkpoint).map_err(|e| StoreError::Corrupt {
            document: "checkpoints.json".to_owned(),
            reason: e.to_string(),
        })?;
        self.checkpoints
            .update(|map| {
                map.insert(key.document_key(), value);
            })
            .await
    }

    /// Removes the checkpoint; returns whether one existed.
    pub async fn clear_checkpoint(&self, key: &ServiceKey) -> Result<bool, StoreError> {
        self.checkpoints
            .update_if(|map| map.remove(&key.document_key()).is_some())
            .await
    }

    /// Increments the per-source counter and returns the new value.
    pub async fn increment_counter(&self, source: &str) -> Result<u64, StoreError> {
        self.counters
            .update(|map| {
                let count = map.entry(source.to_owned()).or_insert(0);
                *count = count.saturating_add(1);
                *count
            })
            .await
    }

    pub async fn counter(&self, source: &str) -> Result<u64, StoreError> {
        Ok(self
            .counters
            .load()
            .await?
            .get(source)
            .copied()
            .unwrap_or(0))
    }
}
