//! Agent error types
//!
//! [`AgentError`] covers every failure inside the monitoring engine.
//! `From<AgentError> for LoglensError` lets the daemon propagate them with `?`.
//!
//! Component boundaries return `Result<_, AgentError>`; the monitor task
//! loop is the one place that logs an error and keeps going.

use loglens_core::error::{LoglensError, StoreError};

/// Monitoring engine error
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Source could not be read (missing, locked, rotated, malformed)
    #[error("source error: {path}: {reason}")]
    Source {
        /// Source path
        path: String,
        /// Failure reason
        reason: String,
    },

    /// Template file could not be loaded
    #[error("template load error: {path}: {reason}")]
    TemplateLoad {
        /// Template file path
        path: String,
        /// Failure reason
        reason: String,
    },

    /// Template definition is invalid
    #[error("template validation error: template '{name}': {reason}")]
    TemplateValidation {
        /// Template name
        name: String,
        /// Failure reason
        reason: String,
    },

    /// Inference capability failed
    #[error("inference error: {0}")]
    Inference(String),

    /// Forwarding failed
    #[error("forward error: {destination}: {reason}")]
    Forward {
        /// `ip:port` destination
        destination: String,
        /// Failure reason
        reason: String,
    },

    /// Persisted document failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("config error: {field}: {reason}")]
    Config {
        /// Config field name
        field: String,
        /// Failure reason
        reason: String,
    },

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Regex compilation error
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl AgentError {
    pub(crate) fn read_failed(path: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Self::Source {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<AgentError> for LoglensError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Store(e) => LoglensError::Store(e),
            AgentError::Io(e) => LoglensError::Io(e),
            AgentError::Source { .. } => LoglensError::Source(err.to_string()),
            AgentError::TemplateLoad { .. }
            | AgentError::TemplateValidation { .. }
            | AgentError::Regex(_) => LoglensError::Template(err.to_string()),
            AgentError::Inference(_) => LoglensError::Inference(err.to_string()),
            AgentError::Forward { .. } => LoglensError::Forward(err.to_string()),
            AgentError::Config { field, reason } => {
                LoglensError::Config(loglens_core::error::ConfigError::InvalidValue {
                    field,
                    reason,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_error_display() {
        let err = AgentError::read_failed("/var/log/app.log", "permission denied");
        let msg = err.to_string();
        assert!(msg.contains("/var/log/app.log"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn converts_to_loglens_error() {
        let err: LoglensError = AgentError::Inference("connection refused".to_owned()).into();
        assert!(matches!(err, LoglensError::Inference(_)));

        let err: LoglensError = AgentError::TemplateValidation {
            name: "fw".to_owned(),
            reason: "bad regex".to_owned(),
        }
        .into();
        assert!(matches!(err, LoglensError::Template(_)));
    }

    #[test]
    fn forward_error_names_destination() {
        let err = AgentError::Forward {
            destination: "10.0.0.5:514".to_owned(),
            reason: "connection refused".to_owned(),
        };
        assert!(err.to_string().contains("10.0.0.5:514"));
    }
}
