//! Template catalog -- loading, classification and lookup.
//!
//! # Modules
//! - [`types`]: template definition and compiled template
//! - [`loader`]: YAML directory scanning
//! - [`classifier`]: accept/reject decision for one record

pub mod classifier;
pub mod loader;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::AgentError;

pub use classifier::matches;
pub use loader::TemplateLoader;
pub use types::{ModelParams, OutputFormat, Template, TemplateDefinition};

/// Currently loaded templates, reloadable from the template directory.
pub struct TemplateCatalog {
    dir: PathBuf,
    templates: RwLock<Vec<Arc<Template>>>,
}

impl TemplateCatalog {
    /// Empty catalog over `dir`; call [`reload`](Self::reload) to populate it.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            templates: RwLock::new(Vec::new()),
        }
    }

    /// Catalog with a fixed template set.
    pub fn from_templates(dir: impl AsRef<Path>, templates: Vec<Template>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            templates: RwLock::new(templates.into_iter().map(Arc::new).collect()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rescans the directory and swaps in the new set.
    ///
    /// On error the previous set stays in place.
    pub async fn reload(&self) -> Result<usize, AgentError> {
        let loaded = TemplateLoader::load_directory(&self.dir).await?;
        let count = loaded.len();
        *self.templates.write().await = loaded.into_iter().map(Arc::new).collect();
        Ok(count)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Template>> {
        self.templates
            .read()
            .await
            .iter()
            .find(|t| t.name == name)
            .cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        self.templates
            .read()
            .await
            .iter()
            .map(|t| t.name.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.templates.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.templates.read().await.is_empty()
    }

    /// First template whose rule accepts `record`.
    ///
    /// Catch-all templates (no pattern, no types) are ignored here; only a
    /// positive type match counts as detection.
    pub async fn detect(&self, record: &str) -> Option<Arc<Template>> {
        self.templates
            .read()
            .await
            .iter()
            .filter(|t| t.type_pattern.is_some())
            .find(|t| matches(record, t))
            .cloned()
    }
}
