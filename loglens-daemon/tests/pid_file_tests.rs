//! PID file lifecycle tests: create, duplicate detection, removal.

use loglens_daemon::orchestrator::{remove_pid_file, write_pid_file};
use tempfile::TempDir;

#[test]
fn test_pid_file_contains_current_pid() {
    // Given: A temp directory for the PID file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let pid_path = temp_dir.path().join("loglens.pid");

    // When: Writing the PID file
    write_pid_file(&pid_path).expect("should write PID file");

    // Then: It holds this process's PID
    let content = std::fs::read_to_string(&pid_path).expect("should read PID file");
    assert_eq!(content.trim(), std::process::id().to_string());
}

#[test]
fn test_pid_file_creates_missing_parent() {
    // Given: A PID path below directories that do not exist yet
    let temp_dir = TempDir::new().expect("should create temp dir");
    let pid_path = temp_dir.path().join("run").join("loglens").join("loglens.pid");

    // When: Writing the PID file
    let result = write_pid_file(&pid_path);

    // Then: The parents are created
    assert!(result.is_ok(), "write should succeed: {:?}", result.err());
    assert!(pid_path.exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&pid_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600, "PID file should be owner read/write only");
    }
}

#[test]
fn test_pid_file_duplicate_is_rejected() {
    // Given: A PID file left by another instance
    let temp_dir = TempDir::new().expect("should create temp dir");
    let pid_path = temp_dir.path().join("loglens.pid");
    std::fs::write(&pid_path, "4242\n").expect("should write PID file");

    // When: Writing the PID file again
    let err = write_pid_file(&pid_path).expect_err("duplicate should be rejected");

    // Then: The error names the existing PID and the file is untouched
    assert!(err.to_string().contains("4242"), "error was: {err}");
    assert_eq!(std::fs::read_to_string(&pid_path).unwrap(), "4242\n");
}

#[test]
fn test_remove_pid_file_tolerates_missing_file() {
    // Given: A path with no PID file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let pid_path = temp_dir.path().join("absent.pid");

    // When / Then: Removal only logs
    remove_pid_file(&pid_path);
    assert!(!pid_path.exists());
}
