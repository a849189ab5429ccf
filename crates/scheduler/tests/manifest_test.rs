//! Registering jobs from a TOML manifest, the way `cadence-worker` does.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cadence_core::CadenceConfig;
use cadence_scheduler::manifest::job_options;
use cadence_scheduler::{Control, JobStatus, Timer};

const MANIFEST: &str = r#"
[timer]
interval_ms = 10
worker_threads = 2

[[jobs]]
name = "fast"
every = "50ms"
command = "true"
singleton = true

[[jobs]]
name = "limited"
every = "20ms"
command = "true"
times = 2

[[jobs]]
name = "held"
every = "20ms"
command = "true"
paused = true

[[jobs]]
name = "nightly"
cron = "0 3 * * *"
command = "true"
"#;

#[test]
fn manifest_jobs_register_and_run() {
    let config = CadenceConfig::from_toml(MANIFEST).unwrap();
    let timer = Timer::new(config.timer.clone()).unwrap();

    let mut counters = Vec::new();
    for entry in &config.jobs {
        let hits = Arc::new(AtomicUsize::new(0));
        let cb_hits = Arc::clone(&hits);
        let opts = job_options(entry).unwrap().callback(move |_| {
            cb_hits.fetch_add(1, Ordering::SeqCst);
            Ok(Control::Continue)
        });
        let job = timer.add_job(opts).unwrap();
        counters.push((job, hits));
    }
    assert_eq!(timer.len(), 4);

    let deadline = Instant::now() + Duration::from_secs(5);
    while counters[0].1.load(Ordering::SeqCst) < 3 || !counters[1].0.is_closed() {
        assert!(Instant::now() < deadline, "manifest jobs did not progress");
        thread::sleep(Duration::from_millis(10));
    }

    let (fast, _) = &counters[0];
    assert_eq!(fast.name(), "fast");
    assert!(fast.is_singleton());

    let (limited, limited_hits) = &counters[1];
    assert!(limited.is_closed());
    assert_eq!(limited_hits.load(Ordering::SeqCst), 2);

    let (held, held_hits) = &counters[2];
    assert_eq!(held.status(), JobStatus::Stopped);
    assert_eq!(held_hits.load(Ordering::SeqCst), 0);

    let (nightly, nightly_hits) = &counters[3];
    assert!(nightly.next_start().is_some());
    assert_eq!(nightly_hits.load(Ordering::SeqCst), 0);
}
