//! Domain types -- the persisted entities every component exchanges.
//!
//! All of these are plain key-value documents on disk; the [`ServiceKey`]
//! convention is the only relation between them.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Returns the file name component of a source path.
///
/// Falls back to the full input when the path has no file name
/// (e.g. it ends in `..`).
pub fn source_basename(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Identity of one (source, template) monitoring relationship.
///
/// Primary key across button states, checkpoints and the service registry.
/// Counters are keyed by [`ServiceKey::source`] alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    /// Basename of the monitored source path
    pub source: String,
    /// Template name
    pub template: String,
}

impl ServiceKey {
    /// Builds the key for a source path and template name.
    pub fn new(path: impl AsRef<Path>, template: impl Into<String>) -> Self {
        Self {
            source: source_basename(path),
            template: template.into(),
        }
    }

    /// Persisted document key (`{basename}_{template}`).
    pub fn document_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.source, self.template)
    }
}

/// Kind of a monitored source, decided once when a monitor starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Line-oriented text file, tailed by byte offset
    Text,
    /// Binary record-oriented event log, tailed by (timestamp, record id)
    StructuredLog,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::StructuredLog => write!(f, "structured-log"),
        }
    }
}

/// Desired state of one service, persisted independently of whether a
/// task is actually running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonState {
    /// `false` forces deletion (stop + checkpoint reset)
    #[serde(default)]
    pub enabled: bool,
    /// Whether a monitor task should be live
    #[serde(default)]
    pub started: bool,
}

impl ButtonState {
    /// Enabled and started: the only state restored at process start.
    pub fn is_active(&self) -> bool {
        self.enabled && self.started
    }
}

/// Durable resume position of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Checkpoint {
    /// Text source position
    Text {
        /// Byte offset of the next unread byte
        offset: u64,
    },
    /// Structured-log source position
    EventLog {
        /// Highest processed record id
        last_id: u64,
        /// Timestamp of the highest processed record
        #[serde(default)]
        last_timestamp: Option<DateTime<Utc>>,
    },
}

/// Transport used by the forwarder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    #[serde(rename = "TCP", alias = "tcp")]
    Tcp,
    #[serde(rename = "UDP", alias = "udp")]
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "TCP"),
            Self::Udp => write!(f, "UDP"),
        }
    }
}

/// Forwarding destination.
///
/// A global default plus optional per-source overrides; resolution picks
/// one whole config, fields are never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwarderConfig {
    pub ip: String,
    #[serde(deserialize_with = "port_from_number_or_string")]
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_owned(),
            port: 514,
            protocol: Protocol::Tcp,
        }
    }
}

impl ForwarderConfig {
    /// `ip:port` destination string.
    pub fn destination(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Number(u16),
        Text(String),
    }

    match PortRepr::deserialize(deserializer)? {
        PortRepr::Number(port) => Ok(port),
        PortRepr::Text(text) => text
            .trim()
            .parse::<u16>()
            .map_err(|e| serde::de::Error::custom(format!("invalid port '{text}': {e}"))),
    }
}

/// Model assigned to a template.
///
/// Persisted as `[model, temperature, top_k, top_p]`; trailing entries
/// may be missing and numbers may be stored as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AssociationRepr", into = "Vec<Value>")]
pub struct ModelAssociation {
    pub model: String,
    pub temperature: Option<f32>,
    pub top_k: Option<u32>,
    pub top_p: Option<f32>,
}

impl ModelAssociation {
    /// Association with only a model id.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            top_k: None,
            top_p: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AssociationRepr {
    List(Vec<Value>),
    Model(String),
}

impl TryFrom<AssociationRepr> for ModelAssociation {
    type Error = String;

    fn try_from(repr: AssociationRepr) -> Result<Self, Self::Error> {
        let values = match repr {
            AssociationRepr::Model(model) => return Ok(Self::new(model)),
            AssociationRepr::List(values) => values,
        };

        let model = match values.first() {
            Some(Value::String(model)) => model.clone(),
            Some(other) => return Err(format!("model id must be a string, got {other}")),
            None => return Err("association must name a model".to_owned()),
        };

        Ok(Self {
            model,
            temperature: values.get(1).and_then(number_like).map(|v| v as f32),
            top_k: values.get(2).and_then(number_like).map(|v| v as u32),
            top_p: values.get(3).and_then(number_like).map(|v| v as f32),
        })
    }
}

impl From<ModelAssociation> for Vec<Value> {
    fn from(assoc: ModelAssociation) -> Self {
        let opt = |v: Option<f64>| v.map(Value::from).unwrap_or(Value::Null);
        vec![
            Value::String(assoc.model),
            opt(assoc.temperature.map(f64::from)),
            opt(assoc.top_k.map(f64::from)),
            opt(assoc.top_p.map(f64::from)),
        ]
    }
}

fn number_like(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// How a monitor task treats matched records, resolved once at start.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingMode {
    /// Forward raw records without classification or transformation
    Passthrough,
    /// Classify, transform through the assigned model, then forward
    Transform(ModelAssociation),
}

impl ProcessingMode {
    /// No association (or an empty model id) means passthrough.
    pub fn from_association(association: Option<ModelAssociation>) -> Self {
        match association {
            Some(assoc) if !assoc.model.trim().is_empty() => Self::Transform(assoc),
            _ => Self::Passthrough,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Passthrough)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_key_uses_basename() {
        let key = ServiceKey::new("/var/log/auth.log", "ssh");
        assert_eq!(key.source, "auth.log");
        assert_eq!(key.document_key(), "auth.log_ssh");
    }

    #[test]
    fn checkpoint_variants_round_trip_through_json() {
        let text: Checkpoint = serde_json::from_str(r#"{"offset": 42}"#).unwrap();
        assert_eq!(text, Checkpoint::Text { offset: 42 });

        let evtx: Checkpoint = serde_json::from_str(r#"{"last_id": 7}"#).unwrap();
        assert_eq!(
            evtx,
            Checkpoint::EventLog {
                last_id: 7,
                last_timestamp: None
            }
        );
    }

    #[test]
    fn forwarder_config_accepts_string_port() {
        let cfg: ForwarderConfig =
            serde_json::from_str(r#"{"ip": "10.0.0.1", "port": "5514", "protocol": "UDP"}"#)
                .unwrap();
        assert_eq!(cfg.port, 5514);
        assert_eq!(cfg.protocol, Protocol::Udp);
        assert_eq!(cfg.destination(), "10.0.0.1:5514");
    }

    #[test]
    fn forwarder_config_rejects_bad_port() {
        let result: Result<ForwarderConfig, _> =
            serde_json::from_str(r#"{"ip": "10.0.0.1", "port": "http"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn association_parses_partial_list() {
        let assoc: ModelAssociation =
            serde_json::from_str(r#"["phi-2.gguf", "0.2", 40]"#).unwrap();
        assert_eq!(assoc.model, "phi-2.gguf");
        assert_eq!(assoc.temperature, Some(0.2));
        assert_eq!(assoc.top_k, Some(40));
        assert_eq!(assoc.top_p, None);
    }

    #[test]
    fn association_rejects_non_string_model() {
        let result: Result<ModelAssociation, _> = serde_json::from_str("[1, 2]");
        assert!(result.is_err());
    }

    #[test]
    fn processing_mode_resolution() {
        assert!(ProcessingMode::from_association(None).is_passthrough());
        assert!(ProcessingMode::from_association(Some(ModelAssociation::new(" "))).is_passthrough());
        assert!(
            !ProcessingMode::from_association(Some(ModelAssociation::new("tiny.gguf")))
                .is_passthrough()
        );
    }

    #[test]
    fn button_state_default_is_inactive() {
        let state = ButtonState::default();
        assert!(!state.enabled);
        assert!(!state.is_active());
    }
}
