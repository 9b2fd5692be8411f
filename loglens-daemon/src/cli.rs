//! CLI argument definitions for loglens-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Loglens log intelligence agent.
///
/// Tails configured log sources, transforms records through the
/// configured inference server and forwards them to collectors.
#[derive(Parser, Debug)]
#[command(name = "loglens-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to loglens.toml configuration file.
    #[arg(short, long, default_value = "/etc/loglens/loglens.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl DaemonCli {
    /// Applies CLI overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut loglens_core::config::LoglensConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file = pid_file.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loglens_core::config::LoglensConfig;

    #[test]
    fn defaults_point_at_system_config() {
        let cli = DaemonCli::parse_from(["loglens-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/loglens/loglens.toml"));
        assert!(!cli.validate);
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn overrides_replace_config_values() {
        let cli = DaemonCli::parse_from([
            "loglens-daemon",
            "--config",
            "/tmp/l.toml",
            "--log-level",
            "debug",
            "--log-format",
            "pretty",
            "--pid-file",
            "",
        ]);
        let mut config = LoglensConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.log_format, "pretty");
        assert!(config.general.pid_file.is_empty());
    }

    #[test]
    fn absent_overrides_keep_config() {
        let cli = DaemonCli::parse_from(["loglens-daemon", "--validate"]);
        let mut config = LoglensConfig::default();
        let before = config.general.pid_file.clone();
        cli.apply_overrides(&mut config);

        assert!(cli.validate);
        assert_eq!(config.general.pid_file, before);
        assert_eq!(config.general.log_level, "info");
    }
}
