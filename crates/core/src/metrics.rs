//! Metric name constants and descriptions
//!
//! Every Prometheus metric name lives here; components call
//! `metrics::counter!()` / `metrics::gauge!()` / `metrics::histogram!()`
//! with these constants.
//!
//! # Naming convention
//!
//! - prefix: `loglens_`
//! - suffix: `_total` (counter), `_seconds` (histogram), none (gauge)

// --- label keys ---

/// Source kind label (text, structured-log)
pub const LABEL_SOURCE_KIND: &str = "kind";

/// Transform outcome label (timeout, llm_error)
pub const LABEL_OUTCOME: &str = "outcome";

/// Transport label (TCP, UDP)
pub const LABEL_PROTOCOL: &str = "protocol";

// --- agent metrics ---

/// Records read from sources (counter, label: kind)
pub const RECORDS_READ_TOTAL: &str = "loglens_records_read_total";

/// Records forwarded to the collector (counter)
pub const RECORDS_FORWARDED_TOTAL: &str = "loglens_records_forwarded_total";

/// Records rejected by the classifier (counter)
pub const RECORDS_REJECTED_TOTAL: &str = "loglens_records_rejected_total";

/// Transformations that ended in a sentinel result (counter, label: outcome)
pub const TRANSFORM_FAILURES_TOTAL: &str = "loglens_transform_failures_total";

/// Forwarding attempts that failed (counter, label: protocol)
pub const FORWARD_FAILURES_TOTAL: &str = "loglens_forward_failures_total";

/// Source read errors (counter, label: kind)
pub const SOURCE_ERRORS_TOTAL: &str = "loglens_source_errors_total";

/// Transformation latency (histogram, seconds)
pub const TRANSFORM_DURATION_SECONDS: &str = "loglens_transform_duration_seconds";

/// Live monitor tasks (gauge)
pub const ACTIVE_SERVICES: &str = "loglens_active_services";

/// Daemon uptime (gauge, seconds)
pub const DAEMON_UPTIME_SECONDS: &str = "loglens_daemon_uptime_seconds";

/// Registers descriptions for every metric.
///
/// Called once after the recorder is installed.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(RECORDS_READ_TOTAL, "Records read from monitored sources");
    describe_counter!(RECORDS_FORWARDED_TOTAL, "Records forwarded to the collector");
    describe_counter!(RECORDS_REJECTED_TOTAL, "Records rejected by template classification");
    describe_counter!(
        TRANSFORM_FAILURES_TOTAL,
        "Transformations that timed out or failed"
    );
    describe_counter!(FORWARD_FAILURES_TOTAL, "Forwarding attempts that failed");
    describe_counter!(SOURCE_ERRORS_TOTAL, "Errors while reading monitored sources");
    describe_histogram!(
        TRANSFORM_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Time spent transforming one record"
    );
    describe_gauge!(ACTIVE_SERVICES, "Live monitor tasks");
    describe_gauge!(
        DAEMON_UPTIME_SECONDS,
        metrics::Unit::Seconds,
        "Seconds since daemon start"
    );
}
