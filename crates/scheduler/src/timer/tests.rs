use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cadence_core::{TimerConfig, TracedError};
use chrono::{TimeZone, Utc};

use super::{default_timer, init_default, Timer};
use crate::error::SchedulerError;
use crate::job::{Control, Job, JobOptions};
use crate::runner::Submission;
use crate::schedule::ScheduleSpec;
use crate::state::{JobStatus, TimerStatus};

const HOUR: Duration = Duration::from_secs(3600);

/// Timer whose own tick thread never fires during a test; ticks are
/// driven by calling `proceed` directly.
fn manual_timer() -> Timer {
    Timer::new(TimerConfig {
        interval_ms: HOUR.as_millis() as u64,
        worker_threads: 2,
        max_in_flight: 0,
        cron_recheck_ms: HOUR.as_millis() as u64,
    })
    .unwrap()
}

fn drive(timer: &Timer, ticks: std::ops::RangeInclusive<i64>) {
    for tick in ticks {
        timer.inner.proceed(tick, Utc::now());
    }
}

fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

fn counter() -> (Arc<AtomicUsize>, impl Fn(&Job) -> crate::job::JobResult + Send + Sync + 'static) {
    let hits = Arc::new(AtomicUsize::new(0));
    let cb_hits = Arc::clone(&hits);
    (hits, move |_: &Job| {
        cb_hits.fetch_add(1, Ordering::SeqCst);
        Ok(Control::Continue)
    })
}

#[test]
fn interval_job_fires_every_k_ticks() {
    let timer = manual_timer();
    let (hits, cb) = counter();
    let job = timer.add_interval(3 * HOUR, cb).unwrap();
    assert_eq!(timer.len(), 1);

    drive(&timer, 1..=9);
    wait_until("three runs", || hits.load(Ordering::SeqCst) == 3);
    assert_eq!(job.next_tick(), 12);
    assert_eq!(timer.len(), 1);
}

#[test]
fn stopped_timer_advances_without_burst() {
    let timer = manual_timer();
    let (hits, cb) = counter();
    let job = timer.add_interval(HOUR, cb).unwrap();

    assert!(timer.stop());
    assert_eq!(timer.status(), TimerStatus::Stopped);
    drive(&timer, 1..=5);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    assert!(timer.start());
    drive(&timer, 6..=6);
    wait_until("one run after resume", || hits.load(Ordering::SeqCst) == 1);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(job.next_tick(), 7);
}

#[test]
fn stopped_job_keeps_position() {
    let timer = manual_timer();
    let (hits, cb) = counter();
    let job = timer.add_job(JobOptions::every(2 * HOUR).paused().callback(cb)).unwrap();
    assert_eq!(job.status(), JobStatus::Stopped);

    drive(&timer, 1..=6);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(job.next_tick(), 8);

    assert!(job.start());
    drive(&timer, 7..=8);
    wait_until("run after start", || hits.load(Ordering::SeqCst) == 1);
}

#[test]
fn closed_job_leaves_queue_on_next_pop() {
    let timer = manual_timer();
    let (hits, cb) = counter();
    let job = timer.add_interval(HOUR, cb).unwrap();
    job.close();
    assert!(timer.contains(&job));

    drive(&timer, 1..=3);
    assert!(!timer.contains(&job));
    assert!(timer.is_empty());
    thread::sleep(Duration::from_millis(30));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn closed_job_is_purged_before_its_next_tick() {
    let timer = manual_timer();
    let (_hits, cb) = counter();
    let far = timer.add_interval(50 * HOUR, cb).unwrap();
    let (_, cb) = counter();
    let near = timer.add_interval(2 * HOUR, cb).unwrap();
    assert_eq!(far.next_tick(), 50);

    far.close();
    assert!(timer.inner.reap.load(Ordering::SeqCst));
    assert_eq!(timer.inner.reap_closed(1), 1);
    assert!(!timer.contains(&far));
    assert!(timer.contains(&near));
    assert_eq!(timer.inner.queue.next_priority(), 2);
}

#[test]
fn times_limit_runs_exactly_n() {
    let timer = manual_timer();
    let (hits, cb) = counter();
    let job = timer.add_times(HOUR, 3, cb).unwrap();

    for tick in 1..=10 {
        timer.inner.proceed(tick, Utc::now());
        thread::sleep(Duration::from_millis(5));
    }
    wait_until("job closed", || job.is_closed());
    wait_until("runner idle", || {
        let s = job.state();
        s.pending == 0 && s.running == 0
    });
    drive(&timer, 11..=11);

    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(job.state().runs, 3);
    assert!(!timer.contains(&job));
}

#[test]
fn add_once_runs_then_closes() {
    let timer = manual_timer();
    let (hits, cb) = counter();
    let job = timer.add_once(2 * HOUR, cb).unwrap();
    drive(&timer, 1..=6);
    wait_until("single run", || job.is_closed());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn exhausted_cron_runs_final_occurrence_then_closes() {
    let timer = manual_timer();
    let (hits, cb) = counter();
    let job = timer.add_cron("0 0 0 1 1 * 2031", cb).unwrap();
    assert_eq!(job.next_tick(), 1);

    let fire_at = Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap();
    timer.inner.proceed(1, fire_at);
    assert!(!timer.contains(&job));

    wait_until("final run closes job", || job.is_closed());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn cron_not_yet_due_is_pushed_back() {
    let timer = manual_timer();
    let (hits, cb) = counter();
    let job = timer.add_cron("0 0 0 1 1 * 2031", cb).unwrap();

    timer.inner.proceed(1, Utc::now());
    assert!(timer.contains(&job));
    assert_eq!(job.next_tick(), 2);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn group_job_fires_on_union() {
    let timer = manual_timer();
    let (hits, cb) = counter();
    let job = timer
        .add_job(
            JobOptions::any(vec![
                ScheduleSpec::Every(3 * HOUR),
                ScheduleSpec::Every(5 * HOUR),
            ])
            .callback(cb),
        )
        .unwrap();

    // Fires at 3, 5, 6, 9, 10, 12, 15.
    drive(&timer, 1..=15);
    wait_until("seven runs", || hits.load(Ordering::SeqCst) == 7);
    assert_eq!(job.next_tick(), 18);
}

#[test]
fn invalid_jobs_are_not_queued() {
    let timer = manual_timer();
    let err = timer
        .add_cron("not a cron", |_| Ok(Control::Continue))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidCron { .. }));

    let err = timer
        .add_interval(Duration::ZERO, |_| Ok(Control::Continue))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidInterval(_)));

    let err = timer
        .add_job(JobOptions::every(HOUR).name("silent"))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::MissingCallback(_)));

    let err = timer
        .add_job(JobOptions::any(Vec::new()).callback(|_| Ok(Control::Continue)))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::EmptyGroup));

    assert!(timer.is_empty());
}

#[test]
fn trigger_runs_outside_schedule() {
    let timer = manual_timer();
    let (hits, cb) = counter();
    let job = timer.add_interval(100 * HOUR, cb).unwrap();
    assert_eq!(timer.trigger(&job), Submission::Queued);
    wait_until("triggered run", || hits.load(Ordering::SeqCst) == 1);
    wait_until("dispatch counted", || timer.metrics().dispatched == 1);
}

#[test]
fn errors_surface_in_job_state() {
    let timer = manual_timer();
    let job = timer
        .add_interval(HOUR, |_| Err(TracedError::msg("backend timeout")))
        .unwrap();
    drive(&timer, 1..=4);
    wait_until("four failures", || job.state().failures == 4);
    let stats = job.state();
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].count, 4);
    assert_eq!(stats.successes, 0);
}

#[test]
fn tune_pool_updates_metrics() {
    let timer = manual_timer();
    assert_eq!(timer.metrics().pool_capacity, None);
    timer.tune_pool(Some(8));
    let m = timer.metrics();
    assert_eq!(m.pool_capacity, Some(8));
    assert_eq!(m.pool_threads, 2);
    assert_eq!(m.status, TimerStatus::Running);
}

#[test]
fn close_closes_jobs_and_refuses_new_ones() {
    let timer = manual_timer();
    let (_hits, cb) = counter();
    let job = timer.add_interval(HOUR, cb).unwrap();

    timer.close();
    assert_eq!(timer.status(), TimerStatus::Closed);
    assert!(job.is_closed());
    assert!(timer.is_empty());
    assert!(!timer.start());
    assert!(matches!(
        timer.add_interval(HOUR, |_| Ok(Control::Continue)),
        Err(SchedulerError::Closed)
    ));
    timer.close();
}

#[test]
fn invalid_config_is_rejected() {
    let err = Timer::new(TimerConfig {
        interval_ms: 0,
        ..TimerConfig::default()
    })
    .unwrap_err();
    assert!(matches!(err, SchedulerError::Config(_)));
}

#[test]
fn default_timer_initializes_once() {
    let config = TimerConfig {
        worker_threads: 1,
        ..TimerConfig::default()
    };
    let first = init_default(config.clone()).unwrap();
    assert!(std::ptr::eq(first, default_timer().unwrap()));
    assert!(matches!(
        init_default(config),
        Err(SchedulerError::AlreadyInitialized)
    ));
}
