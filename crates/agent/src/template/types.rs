//! Template definitions and their compiled form.

use std::collections::HashSet;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Substitution point inside a model template.
pub const PROMPT_PLACEHOLDER: &str = "{{ .Prompt }}";

/// Marker placed between the instruction and the raw record.
pub const RAW_RECORD_MARKER: &str = "RAW_LOG: ";

/// Completion length used when a template does not set `max_tokens`.
pub const DEFAULT_MAX_TOKENS: u32 = 256;

/// Longest accepted `type_regex`.
const MAX_PATTERN_LENGTH: usize = 1000;

/// Wire format of a transformed record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OutputFormat {
    /// Model output forwarded as-is (expected JSON)
    #[default]
    Json,
    /// Model JSON converted to an RFC 3164 line
    Syslog,
    /// Model output forwarded as-is (expected CEF)
    Cef,
    /// Any other declared format, forwarded as-is
    Raw,
}

impl From<String> for OutputFormat {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "" | "JSON" => Self::Json,
            "SYSLOG" => Self::Syslog,
            "CEF" => Self::Cef,
            _ => Self::Raw,
        }
    }
}

impl From<OutputFormat> for String {
    fn from(format: OutputFormat) -> Self {
        format.to_string()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "JSON"),
            Self::Syslog => write!(f, "SYSLOG"),
            Self::Cef => write!(f, "CEF"),
            Self::Raw => write!(f, "RAW"),
        }
    }
}

/// Sampling parameters declared by a template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    #[serde(default)]
    pub stop: Vec<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default, alias = "n_predict")]
    pub max_tokens: Option<u32>,
}

/// Template file as written on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDefinition {
    /// Template name; the file stem is used when absent
    #[serde(default)]
    pub name: String,
    /// Pattern whose first capture group is the record type
    #[serde(default)]
    pub type_regex: String,
    /// Record types this template accepts
    #[serde(default)]
    pub types: Vec<String>,
    /// Instruction text given to the model
    #[serde(default, alias = "instruction")]
    pub prompt: String,
    /// Prompt wrapper containing `{{ .Prompt }}`
    #[serde(default)]
    pub output_template: String,
    #[serde(default)]
    pub model_params: ModelParams,
    #[serde(default)]
    pub output_format: OutputFormat,
}

/// Loaded template, immutable once built.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub type_pattern: Option<Regex>,
    pub accepted_types: HashSet<String>,
    pub prompt: String,
    pub model_template: String,
    pub model_params: ModelParams,
    pub output_format: OutputFormat,
}

impl Template {
    /// Validates a definition and compiles its pattern.
    pub fn compile(definition: TemplateDefinition) -> Result<Self, AgentError> {
        let name = definition.name.trim().to_owned();
        if name.is_empty() {
            return Err(AgentError::TemplateValidation {
                name: "<unnamed>".to_owned(),
                reason: "name must not be empty".to_owned(),
            });
        }

        let pattern = definition.type_regex.trim();
        let type_pattern = if pattern.is_empty() {
            None
        } else {
            if pattern.len() > MAX_PATTERN_LENGTH {
                return Err(AgentError::TemplateValidation {
                    name,
                    reason: format!("type_regex too long (max {MAX_PATTERN_LENGTH})"),
                });
            }
            let regex = Regex::new(pattern).map_err(|e| AgentError::TemplateValidation {
                name: name.clone(),
                reason: format!("invalid type_regex: {e}"),
            })?;
            Some(regex)
        };

        Ok(Self {
            name,
            type_pattern,
            accepted_types: definition
                .types
                .into_iter()
                .map(|t| t.trim().to_owned())
                .filter(|t| !t.is_empty())
                .collect(),
            prompt: definition.prompt.trim().to_owned(),
            model_template: definition.output_template,
            model_params: definition.model_params,
            output_format: definition.output_format,
        })
    }

    /// Builds the full model prompt for one record.
    pub fn build_prompt(&self, record: &str) -> String {
        let constructed = format!("{}\n{RAW_RECORD_MARKER}{record}", self.prompt);
        let wrapper = self.model_template.trim();

        if wrapper.is_empty() {
            constructed
        } else if wrapper.contains(PROMPT_PLACEHOLDER) {
            wrapper.replace(PROMPT_PLACEHOLDER, &constructed)
        } else {
            format!("{wrapper}\n{constructed}")
        }
    }

    /// Stop sequences, defaulting per output format.
    pub fn stop_sequences(&self) -> Vec<String> {
        if !self.model_params.stop.is_empty() {
            return self.model_params.stop.clone();
        }
        match self.output_format {
            OutputFormat::Json => vec!["}".to_owned()],
            _ => vec!["\n".to_owned()],
        }
    }

    pub fn max_tokens(&self) -> u32 {
        self.model_params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }
}
