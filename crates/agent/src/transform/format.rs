//! Output format conversion for model completions.

use chrono::{Local, NaiveDateTime};
use serde_json::{Map, Value};

/// `<PRI>` for facility local0, severity informational.
pub const SYSLOG_PRIORITY: u8 = 134;

const SYSLOG_TIMESTAMP_FORMAT: &str = "%b %d %H:%M:%S";

/// Converts a JSON object completion into an RFC 3164 line stamped now.
///
/// Input that is not a JSON object is returned unchanged.
pub fn json_to_syslog(text: &str, hostname: &str) -> String {
    json_to_syslog_at(text, hostname, Local::now().naive_local())
}

/// [`json_to_syslog`] with an explicit timestamp.
pub fn json_to_syslog_at(text: &str, hostname: &str, timestamp: NaiveDateTime) -> String {
    let fields = match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(fields)) => fields,
        _ => return text.to_owned(),
    };

    let event_id = fields
        .get("EventID")
        .and_then(scalar_text)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| "Unknown".to_owned());

    let pairs = key_value_pairs(&fields);
    let stamp = timestamp.format(SYSLOG_TIMESTAMP_FORMAT);

    if pairs.is_empty() {
        format!("<{SYSLOG_PRIORITY}>{stamp} {hostname} EventID{event_id}:")
    } else {
        format!("<{SYSLOG_PRIORITY}>{stamp} {hostname} EventID{event_id}: {pairs}")
    }
}

/// Restores the braces a `}` stop sequence or a `{` prompt suffix removed.
pub fn restore_json_braces(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(trimmed.len() + 2);
    if !trimmed.starts_with('{') {
        out.push('{');
    }
    out.push_str(trimmed);
    if !trimmed.ends_with('}') {
        out.push('}');
    }
    out
}

/// Brace-restored `text` when it then parses as a JSON object.
pub fn repair_json_object(text: &str) -> Option<String> {
    let repaired = restore_json_braces(text);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(Value::Object(_)) => Some(repaired),
        _ => None,
    }
}

fn key_value_pairs(fields: &Map<String, Value>) -> String {
    fields
        .iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::Array(items) if items.is_empty() => return None,
                Value::Object(map) if map.is_empty() => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if text.is_empty() {
                None
            } else {
                Some(format!("{key}={text}"))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
