//! Daemon configuration tests: file loading, env and CLI precedence.

use clap::Parser;
use loglens_core::config::LoglensConfig;
use loglens_daemon::cli::DaemonCli;
use serial_test::serial;

const SAMPLE: &str = r#"
[general]
log_level = "warn"
log_format = "json"
pid_file = ""

[agent]
data_dir = "/srv/loglens"
reconcile_interval_ms = 1000

[inference]
backend = "disabled"
"#;

#[test]
fn test_example_config_parses_and_validates() {
    // Given: The example file shipped at the repository root
    let example = std::fs::read_to_string(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../loglens.toml.example"
    ))
    .expect("example config should exist");

    // When: Parsing it
    let config = LoglensConfig::parse(&example).expect("example should parse");

    // Then: It validates and matches the built-in defaults
    config.validate().expect("example should validate");
    let defaults: toml::Value = toml::from_str(&example).unwrap();
    assert_eq!(
        defaults["agent"]["transform_timeout_secs"].as_integer(),
        Some(30)
    );
    assert_eq!(config.agent.stop_timeout_secs, 5);
}

#[tokio::test]
#[serial]
async fn test_cli_overrides_beat_environment() {
    // Given: A config file and a conflicting environment variable
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("loglens.toml");
    std::fs::write(&path, SAMPLE).unwrap();
    // SAFETY: serialized test, no other thread reads the environment.
    unsafe { std::env::set_var("LOGLENS_GENERAL_LOG_LEVEL", "error") };

    // When: Loading the file, applying env and then CLI overrides
    let cli = DaemonCli::parse_from([
        "loglens-daemon",
        "--config",
        path.to_str().unwrap(),
        "--log-level",
        "debug",
    ]);
    let mut config = LoglensConfig::from_file(&cli.config).await.unwrap();
    config.apply_env_overrides();
    let env_level = config.general.log_level.clone();
    cli.apply_overrides(&mut config);
    unsafe { std::env::remove_var("LOGLENS_GENERAL_LOG_LEVEL") };

    // Then: env beat the file, CLI beat env
    assert_eq!(env_level, "error");
    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.agent.data_dir, "/srv/loglens");
    assert_eq!(config.agent.reconcile_interval_ms, 1000);
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_cli_log_format_fails_validation() {
    // Given: A valid config and an unsupported format override
    let mut config = LoglensConfig::parse(SAMPLE).unwrap();
    let cli = DaemonCli::parse_from(["loglens-daemon", "--log-format", "xml"]);

    // When: Applying the override
    cli.apply_overrides(&mut config);

    // Then: Validation rejects it
    assert!(config.validate().is_err());
}
