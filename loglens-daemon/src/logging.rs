//! Tracing setup for the agent process.
//!
//! Monitor tasks, the reconciliation loop and the forwarder all log with
//! structured fields (`service`, `path`, `error`). JSON lines keep those
//! fields machine-readable for the collector that usually ingests the
//! agent's own output; `pretty` is meant for a terminal.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use loglens_core::config::GeneralConfig;

/// Output encoding selected by `[general].log_format` or `--log-format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(anyhow::anyhow!(
                "log format '{}' is not supported by loglens-daemon (use json or pretty)",
                other
            )),
        }
    }
}

/// Installs the process-wide subscriber.
///
/// `RUST_LOG` wins over `config.log_level` so a single module can be
/// turned up without editing `loglens.toml`. Fails if a subscriber is
/// already installed.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let format = LogFormat::parse(&config.log_format)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("cannot install loglens log subscriber: {}", e))
}
