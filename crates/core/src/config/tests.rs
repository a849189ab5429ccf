use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use super::types::{CadenceConfig, TimerConfig};
use crate::error::ConfigError;

#[test]
fn parse_minimal_toml() {
    let cfg = CadenceConfig::from_toml("").unwrap();
    assert_eq!(cfg.timer, TimerConfig::default());
    assert!(cfg.jobs.is_empty());
}

#[test]
fn parse_full_toml() {
    let toml = r#"
[timer]
interval_ms = 50
worker_threads = 8
max_in_flight = 32
cron_recheck_ms = 500

[[jobs]]
name = "rotate-logs"
cron = "0 3 * * *"
command = "logrotate"
args = ["/etc/logrotate.conf"]
singleton = true

[[jobs]]
name = "heartbeat"
every = "30s"
command = "curl"
args = ["-fsS", "http://localhost:8080/ping"]
times = 10
paused = true
"#;
    let cfg = CadenceConfig::from_toml(toml).unwrap();
    assert_eq!(cfg.timer.interval_ms, 50);
    assert_eq!(cfg.timer.worker_threads, 8);
    assert_eq!(cfg.timer.capacity(), Some(32));
    assert_eq!(cfg.timer.cron_recheck_ticks(), 10);
    assert_eq!(cfg.jobs.len(), 2);

    let rotate = &cfg.jobs[0];
    assert_eq!(rotate.cron.as_deref(), Some("0 3 * * *"));
    assert!(rotate.singleton);
    assert_eq!(rotate.times, None);

    let heartbeat = &cfg.jobs[1];
    assert_eq!(heartbeat.every_duration(), Some(Duration::from_secs(30)));
    assert_eq!(heartbeat.times, Some(10));
    assert!(heartbeat.paused);
}

#[test]
fn timer_defaults() {
    let cfg = TimerConfig::default();
    assert_eq!(cfg.interval(), Duration::from_millis(100));
    assert_eq!(cfg.capacity(), None);
    assert_eq!(cfg.cron_recheck_ticks(), 10);
    assert!(cfg.resolved_worker_threads() > 0);
}

#[test]
fn zero_interval_rejected() {
    let err = CadenceConfig::from_toml("[timer]\ninterval_ms = 0\n").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn recheck_shorter_than_tick_rejected() {
    let toml = "[timer]\ninterval_ms = 200\ncron_recheck_ms = 100\n";
    assert!(CadenceConfig::from_toml(toml).is_err());
}

#[test]
fn job_needs_exactly_one_schedule() {
    let both = r#"
[[jobs]]
name = "a"
every = "1s"
cron = "* * * * *"
command = "true"
"#;
    let err = CadenceConfig::from_toml(both).unwrap_err();
    assert!(err.to_string().contains("both"));

    let neither = r#"
[[jobs]]
name = "a"
command = "true"
"#;
    let err = CadenceConfig::from_toml(neither).unwrap_err();
    assert!(err.to_string().contains("either"));
}

#[test]
fn bad_duration_and_cron_rejected() {
    let bad_every = "[[jobs]]\nname = \"a\"\nevery = \"soon\"\ncommand = \"true\"\n";
    assert!(CadenceConfig::from_toml(bad_every).is_err());

    let bad_cron = "[[jobs]]\nname = \"a\"\ncron = \"* *\"\ncommand = \"true\"\n";
    assert!(CadenceConfig::from_toml(bad_cron).is_err());
}

#[test]
fn duplicate_job_names_rejected() {
    let toml = r#"
[[jobs]]
name = "dup"
every = "1s"
command = "true"

[[jobs]]
name = "dup"
every = "2s"
command = "true"
"#;
    let err = CadenceConfig::from_toml(toml).unwrap_err();
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn zero_times_rejected() {
    let toml = "[[jobs]]\nname = \"a\"\nevery = \"1s\"\ncommand = \"true\"\ntimes = 0\n";
    assert!(CadenceConfig::from_toml(toml).is_err());
}

#[test]
fn overrides_apply_and_ignore_garbage() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("CADENCE_TIMER_INTERVAL_MS", "25"),
        ("CADENCE_TIMER_MAX_IN_FLIGHT", "not-a-number"),
        ("CADENCE_TIMER_WORKER_THREADS", "3"),
    ]);
    let mut cfg = TimerConfig::default();
    cfg.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));
    assert_eq!(cfg.interval_ms, 25);
    assert_eq!(cfg.worker_threads, 3);
    assert_eq!(cfg.max_in_flight, 0);
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[timer]\ninterval_ms = 20").unwrap();
    let cfg = CadenceConfig::from_file(file.path()).unwrap();
    assert_eq!(cfg.timer.interval_ms, 20);
}

#[test]
fn missing_file_is_io_error() {
    let err = CadenceConfig::from_file("/nonexistent/cadence.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}
