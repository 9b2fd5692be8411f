//! Error types -- domain error definitions shared by every loglens crate.

/// Loglens top-level error type
#[derive(Debug, thiserror::Error)]
pub enum LoglensError {
    /// Configuration errors
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Persisted state document errors
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Source reading errors (missing, locked, malformed file)
    #[error("source error: {0}")]
    Source(String),

    /// Template loading or validation errors
    #[error("template error: {0}")]
    Template(String),

    /// Inference capability errors
    #[error("inference error: {0}")]
    Inference(String),

    /// Forwarding errors
    #[error("forward error: {0}")]
    Forward(String),

    /// I/O errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be found
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// Config file could not be parsed
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A config value is out of range or malformed
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Persisted state document errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Document could not be read or written
    #[error("document '{document}' io failed: {reason}")]
    Io { document: String, reason: String },

    /// Document content is not valid for its schema
    #[error("document '{document}' is corrupt: {reason}")]
    Corrupt { document: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_top_level() {
        let err: LoglensError = ConfigError::InvalidValue {
            field: "agent.evtx_tail_limit".to_owned(),
            reason: "must be greater than 0".to_owned(),
        }
        .into();
        assert!(matches!(err, LoglensError::Config(_)));
        assert!(err.to_string().contains("agent.evtx_tail_limit"));
    }

    #[test]
    fn store_error_display_names_document() {
        let err = StoreError::Corrupt {
            document: "checkpoints.json".to_owned(),
            reason: "expected map".to_owned(),
        };
        assert!(err.to_string().contains("checkpoints.json"));
    }
}
