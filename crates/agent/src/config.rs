//! Agent runtime configuration
//!
//! [`AgentConfig`] is derived from the core [`AgentSection`](loglens_core::config::AgentSection)
//! and carries the durations and limits the engine uses at runtime.
//!
//! # Example
//! ```ignore
//! use loglens_core::config::LoglensConfig;
//! use loglens_agent::config::AgentConfig;
//!
//! let core_config = LoglensConfig::default();
//! let config = AgentConfig::from_core(&core_config.agent);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use loglens_core::config::AgentSection;

use crate::error::AgentError;

/// Monitoring engine settings
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Directory holding persisted state documents
    pub data_dir: PathBuf,
    /// Directory scanned for template definitions
    pub template_dir: PathBuf,
    /// Reconciliation loop period
    pub reconcile_interval: Duration,
    /// Sleep between text source polls
    pub text_poll_interval: Duration,
    /// Sleep between structured-log source polls
    pub evtx_poll_interval: Duration,
    /// Most recent structured-log records considered per poll
    pub evtx_tail_limit: usize,
    /// Upper bound on lines read per text poll
    pub max_lines_per_read: usize,
    /// Bounded join timeout for stopping a monitor task
    pub stop_timeout: Duration,
    /// Hard wall-clock limit for one transformation
    pub transform_timeout: Duration,
    /// TCP connect timeout for the forwarder
    pub forward_connect_timeout: Duration,
    /// Forward sentinel results instead of dropping them
    pub forward_transform_failures: bool,
    /// Hostname written into syslog output
    pub hostname: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_core(&AgentSection::default())
    }
}

impl AgentConfig {
    /// Builds the runtime config from the core section.
    ///
    /// An empty hostname is replaced by the local host name.
    pub fn from_core(core: &AgentSection) -> Self {
        let hostname = if core.hostname.trim().is_empty() {
            local_hostname()
        } else {
            core.hostname.clone()
        };

        Self {
            data_dir: PathBuf::from(&core.data_dir),
            template_dir: PathBuf::from(&core.template_dir),
            reconcile_interval: Duration::from_millis(core.reconcile_interval_ms),
            text_poll_interval: Duration::from_millis(core.text_poll_interval_ms),
            evtx_poll_interval: Duration::from_millis(core.evtx_poll_interval_ms),
            evtx_tail_limit: core.evtx_tail_limit,
            max_lines_per_read: core.max_lines_per_read,
            stop_timeout: Duration::from_secs(core.stop_timeout_secs),
            transform_timeout: Duration::from_secs(core.transform_timeout_secs),
            forward_connect_timeout: Duration::from_millis(core.forward_connect_timeout_ms),
            forward_transform_failures: core.forward_transform_failures,
            hostname,
        }
    }

    /// Validates limits that would stall the engine.
    pub fn validate(&self) -> Result<(), AgentError> {
        let durations = [
            ("reconcile_interval", self.reconcile_interval),
            ("text_poll_interval", self.text_poll_interval),
            ("evtx_poll_interval", self.evtx_poll_interval),
            ("stop_timeout", self.stop_timeout),
            ("transform_timeout", self.transform_timeout),
            ("forward_connect_timeout", self.forward_connect_timeout),
        ];
        for (field, value) in durations {
            if value.is_zero() {
                return Err(AgentError::Config {
                    field: field.to_owned(),
                    reason: "must be greater than 0".to_owned(),
                });
            }
        }

        if self.evtx_tail_limit == 0 {
            return Err(AgentError::Config {
                field: "evtx_tail_limit".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.max_lines_per_read == 0 {
            return Err(AgentError::Config {
                field: "max_lines_per_read".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        Ok(())
    }
}

/// Local host name, `localhost` when it cannot be determined.
pub fn local_hostname() -> String {
    #[cfg(unix)]
    {
        let mut buf = [0_u8; 256];
        // SAFETY: buf is valid for buf.len() bytes; gethostname NUL-terminates on success.
        let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
        if rc == 0 {
            let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
            let name = String::from_utf8_lossy(&buf[..len]).trim().to_owned();
            if !name.is_empty() {
                return name;
            }
        }
    }

    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "localhost".to_owned())
}
