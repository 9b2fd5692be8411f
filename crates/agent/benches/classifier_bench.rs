//! Classifier and syslog conversion benchmarks
//!
//! Measures the per-record hot path of a monitor task in transform mode.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use loglens_agent::template::{TemplateLoader, matches};
use loglens_agent::transform::json_to_syslog;

const SSH_TEMPLATE: &str = r#"
name: ssh
type_regex: 'sshd\[\d+\]: (\w+) password'
types: [Failed, Accepted, Invalid]
"#;

const MATCHING: &str =
    "Jan 15 12:00:00 bastion sshd[4211]: Failed password for root from 203.0.113.45 port 51234 ssh2";

const NON_MATCHING: &str =
    "Jan 15 12:00:01 bastion CRON[4300]: (root) CMD (run-parts /etc/cron.hourly)";

const EVENT_JSON: &str = r#"{"EventID":4625,"User":"bob","Workstation":"WS-17","SourceIp":"10.1.2.3","LogonType":3,"Status":"0xC000006D"}"#;

fn bench_classifier(c: &mut Criterion) {
    let template = TemplateLoader::parse_yaml(SSH_TEMPLATE, "bench", "ssh").unwrap();
    let catch_all = TemplateLoader::parse_yaml("name: all\n", "bench", "all").unwrap();

    let mut group = c.benchmark_group("classifier");
    group.throughput(Throughput::Elements(1));

    for (name, record) in [("match", MATCHING), ("no_match", NON_MATCHING)] {
        group.bench_with_input(BenchmarkId::new("ssh", name), record, |b, record| {
            b.iter(|| matches(black_box(record), &template))
        });
    }

    group.bench_function("catch_all", |b| {
        b.iter(|| matches(black_box(MATCHING), &catch_all))
    });

    group.finish();
}

fn bench_json_to_syslog(c: &mut Criterion) {
    let mut group = c.benchmark_group("json_to_syslog");
    group.throughput(Throughput::Elements(1));

    group.bench_function("event", |b| {
        b.iter(|| json_to_syslog(black_box(EVENT_JSON), "collector-01"))
    });
    group.bench_function("fallback_raw", |b| {
        b.iter(|| json_to_syslog(black_box(NON_MATCHING), "collector-01"))
    });

    group.finish();
}

criterion_group!(benches, bench_classifier, bench_json_to_syslog);
criterion_main!(benches);
