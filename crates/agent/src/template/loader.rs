//! Template file loader -- reads YAML template definitions from disk.
//!
//! Scans the template directory for `.yml`/`.yaml` files. A file that
//! fails to load is logged and skipped.

use std::collections::HashSet;
use std::path::Path;

use crate::error::AgentError;

use super::types::{Template, TemplateDefinition};

const MAX_TEMPLATE_FILE_SIZE: u64 = 1024 * 1024; // 1MB
const MAX_TEMPLATES_COUNT: usize = 1_000;

/// Template file loader
pub struct TemplateLoader;

impl TemplateLoader {
    /// Loads every YAML template in `dir`, in file name order.
    ///
    /// # Errors
    /// - the directory cannot be read
    /// - more than `MAX_TEMPLATES_COUNT` templates are found
    pub async fn load_directory(dir: impl AsRef<Path>) -> Result<Vec<Template>, AgentError> {
        let dir = dir.as_ref();

        let mut entries =
            tokio::fs::read_dir(dir)
                .await
                .map_err(|e| AgentError::TemplateLoad {
                    path: dir.display().to_string(),
                    reason: format!("failed to read directory: {e}"),
                })?;

        let mut paths = Vec::new();
        while let Some(entry) =
            entries
                .next_entry()
                .await
                .map_err(|e| AgentError::TemplateLoad {
                    path: dir.display().to_string(),
                    reason: format!("failed to read directory entry: {e}"),
                })?
        {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if is_yaml {
                paths.push(path);
            }
        }
        paths.sort();

        let mut templates = Vec::new();
        let mut seen_names = HashSet::new();

        for path in paths {
            match Self::load_file(&path).await {
                Ok(template) => {
                    if !seen_names.insert(template.name.clone()) {
                        tracing::warn!(
                            template = %template.name,
                            path = %path.display(),
                            "duplicate template name, skipping"
                        );
                        continue;
                    }
                    templates.push(template);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load template file, skipping"
                    );
                }
            }

            if templates.len() > MAX_TEMPLATES_COUNT {
                return Err(AgentError::TemplateLoad {
                    path: dir.display().to_string(),
                    reason: format!("too many templates: max {MAX_TEMPLATES_COUNT}"),
                });
            }
        }

        tracing::debug!(
            dir = %dir.display(),
            count = templates.len(),
            "loaded templates"
        );

        Ok(templates)
    }

    /// Loads one YAML template file.
    ///
    /// A definition without `name` is named after the file stem.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<Template, AgentError> {
        let path = path.as_ref();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| AgentError::TemplateLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_TEMPLATE_FILE_SIZE {
            return Err(AgentError::TemplateLoad {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_TEMPLATE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| AgentError::TemplateLoad {
                    path: path.display().to_string(),
                    reason: format!("failed to read file: {e}"),
                })?;

        let fallback_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self::parse_yaml(&content, &path.display().to_string(), &fallback_name)
    }

    /// Parses a YAML string into a compiled template.
    pub fn parse_yaml(
        yaml_str: &str,
        source: &str,
        fallback_name: &str,
    ) -> Result<Template, AgentError> {
        let mut definition: TemplateDefinition =
            serde_yaml::from_str(yaml_str).map_err(|e| AgentError::TemplateLoad {
                path: source.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?;

        if definition.name.trim().is_empty() {
            definition.name = fallback_name.to_owned();
        }

        Template::compile(definition)
    }
}
