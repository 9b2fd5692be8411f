//! Configuration -- `loglens.toml` parsing and runtime settings
//!
//! [`LoglensConfig`] is the top-level structure holding every section.
//!
//! # Loading precedence
//! 1. CLI flags (highest, applied by the daemon)
//! 2. Environment variables (`LOGLENS_AGENT_DATA_DIR=/srv/loglens` form)
//! 3. Config file (`loglens.toml`)
//! 4. Defaults (`Default` impls)
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), loglens_core::error::LoglensError> {
//! use loglens_core::config::LoglensConfig;
//!
//! let config = LoglensConfig::load("loglens.toml").await?;
//! let config = LoglensConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LoglensError};

/// Loglens unified configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoglensConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl LoglensConfig {
    /// Loads a TOML file, applies environment overrides and validates.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LoglensError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file without environment overrides or validation.
    ///
    /// Callers layering further overrides validate once they are applied.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LoglensError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LoglensError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LoglensError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// Parses a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, LoglensError> {
        toml::from_str(toml_str).map_err(|e| {
            LoglensError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Applies `LOGLENS_{SECTION}_{FIELD}` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGLENS_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGLENS_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "LOGLENS_GENERAL_PID_FILE");

        // Agent
        override_string(&mut self.agent.data_dir, "LOGLENS_AGENT_DATA_DIR");
        override_string(&mut self.agent.template_dir, "LOGLENS_AGENT_TEMPLATE_DIR");
        override_u64(
            &mut self.agent.reconcile_interval_ms,
            "LOGLENS_AGENT_RECONCILE_INTERVAL_MS",
        );
        override_u64(
            &mut self.agent.text_poll_interval_ms,
            "LOGLENS_AGENT_TEXT_POLL_INTERVAL_MS",
        );
        override_u64(
            &mut self.agent.evtx_poll_interval_ms,
            "LOGLENS_AGENT_EVTX_POLL_INTERVAL_MS",
        );
        override_usize(&mut self.agent.evtx_tail_limit, "LOGLENS_AGENT_EVTX_TAIL_LIMIT");
        override_usize(
            &mut self.agent.max_lines_per_read,
            "LOGLENS_AGENT_MAX_LINES_PER_READ",
        );
        override_u64(&mut self.agent.stop_timeout_secs, "LOGLENS_AGENT_STOP_TIMEOUT_SECS");
        override_u64(
            &mut self.agent.transform_timeout_secs,
            "LOGLENS_AGENT_TRANSFORM_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.agent.forward_connect_timeout_ms,
            "LOGLENS_AGENT_FORWARD_CONNECT_TIMEOUT_MS",
        );
        override_bool(
            &mut self.agent.forward_transform_failures,
            "LOGLENS_AGENT_FORWARD_TRANSFORM_FAILURES",
        );
        override_string(&mut self.agent.hostname, "LOGLENS_AGENT_HOSTNAME");

        // Inference
        override_string(&mut self.inference.backend, "LOGLENS_INFERENCE_BACKEND");
        override_string(&mut self.inference.endpoint, "LOGLENS_INFERENCE_ENDPOINT");
        override_u64(
            &mut self.inference.request_timeout_secs,
            "LOGLENS_INFERENCE_REQUEST_TIMEOUT_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "LOGLENS_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "LOGLENS_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "LOGLENS_METRICS_PORT");
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), LoglensError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.agent.data_dir.trim().is_empty() {
            return Err(invalid("agent.data_dir", "must not be empty"));
        }

        let positive = [
            ("agent.reconcile_interval_ms", self.agent.reconcile_interval_ms),
            ("agent.text_poll_interval_ms", self.agent.text_poll_interval_ms),
            ("agent.evtx_poll_interval_ms", self.agent.evtx_poll_interval_ms),
            ("agent.stop_timeout_secs", self.agent.stop_timeout_secs),
            ("agent.transform_timeout_secs", self.agent.transform_timeout_secs),
            (
                "agent.forward_connect_timeout_ms",
                self.agent.forward_connect_timeout_ms,
            ),
            (
                "inference.request_timeout_secs",
                self.inference.request_timeout_secs,
            ),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0"));
            }
        }

        if self.agent.evtx_tail_limit == 0 {
            return Err(invalid("agent.evtx_tail_limit", "must be greater than 0"));
        }
        if self.agent.max_lines_per_read == 0 {
            return Err(invalid("agent.max_lines_per_read", "must be greater than 0"));
        }

        let valid_backends = ["llama_server", "disabled"];
        if !valid_backends.contains(&self.inference.backend.as_str()) {
            return Err(invalid(
                "inference.backend",
                format!("must be one of: {}", valid_backends.join(", ")),
            ));
        }

        if self.metrics.enabled && self.metrics.endpoint != "/metrics" {
            return Err(invalid("metrics.endpoint", "only '/metrics' is supported"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> LoglensError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log format (json, pretty)
    pub log_format: String,
    /// PID file path; empty disables it
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// Monitoring engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Directory holding the persisted state documents
    pub data_dir: String,
    /// Directory scanned for template definitions
    pub template_dir: String,
    /// Reconciliation loop period
    pub reconcile_interval_ms: u64,
    /// Sleep between text source polls
    pub text_poll_interval_ms: u64,
    /// Sleep between structured-log source polls
    pub evtx_poll_interval_ms: u64,
    /// Number of most recent structured-log records considered per poll
    pub evtx_tail_limit: usize,
    /// Upper bound on lines read from a text source per poll
    pub max_lines_per_read: usize,
    /// Bounded join timeout applied when stopping a monitor task
    pub stop_timeout_secs: u64,
    /// Hard wall-clock limit for one transformation
    pub transform_timeout_secs: u64,
    /// TCP connect timeout for the forwarder
    pub forward_connect_timeout_ms: u64,
    /// Forward `TIMEOUT`/`LLMERROR` sentinel lines instead of dropping them
    pub forward_transform_failures: bool,
    /// Hostname written into syslog output; empty means detect
    pub hostname: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            data_dir: "/var/lib/loglens".to_owned(),
            template_dir: "/etc/loglens/templates".to_owned(),
            reconcile_interval_ms: 2000,
            text_poll_interval_ms: 500,
            evtx_poll_interval_ms: 2000,
            evtx_tail_limit: 1000,
            max_lines_per_read: 1000,
            stop_timeout_secs: 5,
            transform_timeout_secs: 30,
            forward_connect_timeout_ms: 3000,
            forward_transform_failures: false,
            hostname: String::new(),
        }
    }
}

/// Inference capability settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Backend kind (llama_server, disabled)
    pub backend: String,
    /// Base URL of the inference server
    pub endpoint: String,
    /// HTTP request timeout
    pub request_timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: "llama_server".to_owned(),
            endpoint: "http://127.0.0.1:8080".to_owned(),
            request_timeout_secs: 60,
        }
    }
}

/// Prometheus exporter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
    pub port: u16,
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9108,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- env override helpers ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = LoglensConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.agent.reconcile_interval_ms, 2000);
        assert_eq!(config.agent.evtx_tail_limit, 1000);
        assert_eq!(config.agent.stop_timeout_secs, 5);
        assert_eq!(config.agent.transform_timeout_secs, 30);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        LoglensConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = LoglensConfig::parse("").unwrap();
        assert_eq!(config.agent.text_poll_interval_ms, 500);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = LoglensConfig::parse(
            r#"
[agent]
data_dir = "/srv/loglens"
evtx_tail_limit = 50
"#,
        )
        .unwrap();
        assert_eq!(config.agent.data_dir, "/srv/loglens");
        assert_eq!(config.agent.evtx_tail_limit, 50);
        assert_eq!(config.agent.max_lines_per_read, 1000);
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = LoglensConfig::parse("[agent\n").unwrap_err();
        assert!(matches!(
            err,
            LoglensError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_tail_limit() {
        let mut config = LoglensConfig::default();
        config.agent.evtx_tail_limit = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("evtx_tail_limit"));
    }

    #[test]
    fn validate_rejects_zero_stop_timeout() {
        let mut config = LoglensConfig::default();
        config.agent.stop_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_backend() {
        let mut config = LoglensConfig::default();
        config.inference.backend = "openai".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("inference.backend"));
    }

    #[test]
    fn validate_rejects_unknown_log_format() {
        let mut config = LoglensConfig::default();
        config.general.log_format = "xml".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: serialized test, no other thread reads the environment.
        unsafe { std::env::set_var("TEST_LOGLENS_STR", "overridden") };
        override_string(&mut val, "TEST_LOGLENS_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_LOGLENS_STR") };
    }

    #[test]
    #[serial]
    fn env_override_invalid_number_keeps_original() {
        let mut val = 7_u64;
        // SAFETY: serialized test, no other thread reads the environment.
        unsafe { std::env::set_var("TEST_LOGLENS_U64_BAD", "seven") };
        override_u64(&mut val, "TEST_LOGLENS_U64_BAD");
        assert_eq!(val, 7);
        unsafe { std::env::remove_var("TEST_LOGLENS_U64_BAD") };
    }

    #[test]
    #[serial]
    fn env_overrides_apply_to_agent_section() {
        let mut config = LoglensConfig::default();
        // SAFETY: serialized test, no other thread reads the environment.
        unsafe {
            std::env::set_var("LOGLENS_AGENT_EVTX_TAIL_LIMIT", "25");
            std::env::set_var("LOGLENS_AGENT_FORWARD_TRANSFORM_FAILURES", "true");
        }
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("LOGLENS_AGENT_EVTX_TAIL_LIMIT");
            std::env::remove_var("LOGLENS_AGENT_FORWARD_TRANSFORM_FAILURES");
        }
        assert_eq!(config.agent.evtx_tail_limit, 25);
        assert!(config.agent.forward_transform_failures);
    }

    #[tokio::test]
    async fn from_file_reports_missing_file() {
        let err = LoglensConfig::from_file("/nonexistent/loglens.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoglensError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
