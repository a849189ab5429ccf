//! cadence-worker: runs the jobs declared in a TOML manifest.
//!
//! Every job executes its `command` with `args` on the timer's worker pool.
//! A non-zero exit status is recorded as a job error.
//!
//! # Usage
//!
//! ```bash
//! cadence-worker --config config/cadence.toml
//!
//! # Via environment variables
//! CADENCE_CONFIG=jobs.toml CADENCE_TIMER_INTERVAL_MS=50 cadence-worker
//! ```

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info};

use cadence_core::config::load_dotenv;
use cadence_core::{CadenceConfig, JobEntry, TracedError};
use cadence_scheduler::manifest::job_options;
use cadence_scheduler::{Control, Job, JobResult, Timer};

/// Run scheduled commands from a job manifest.
#[derive(Parser, Debug)]
#[command(name = "cadence-worker", version, about)]
struct Cli {
    /// Path to the job manifest.
    #[arg(long, env = "CADENCE_CONFIG", default_value = "config/cadence.toml")]
    config: PathBuf,

    /// Interval in seconds between metrics log lines (0 = disabled).
    #[arg(long, env = "CADENCE_REPORT_SECS", default_value_t = 60)]
    report_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(?cli, "starting cadence-worker");

    let config = CadenceConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let timer = Arc::new(Timer::new(config.timer.clone())?);

    for entry in &config.jobs {
        let opts = job_options(entry)?.callback(command_callback(entry));
        let job = timer
            .add_job(opts)
            .with_context(|| format!("registering job '{}'", entry.name))?;
        debug!(job = %job.name(), id = %job.id(), command = %entry.command, "command job registered");
    }
    info!(jobs = config.jobs.len(), "all jobs registered");

    if cli.report_secs > 0 {
        let timer = Arc::clone(&timer);
        let period = Duration::from_secs(cli.report_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                report(&timer);
            }
        });
    }

    shutdown_signal().await;
    info!("shutdown signal received");

    let closing = Arc::clone(&timer);
    tokio::task::spawn_blocking(move || closing.close()).await?;
    report(&timer);

    info!("cadence-worker exited cleanly");
    Ok(())
}

/// Callback that runs `entry.command` to completion.
fn command_callback(entry: &JobEntry) -> impl Fn(&Job) -> JobResult + Send + Sync + 'static {
    let program = entry.command.clone();
    let args = entry.args.clone();
    move |job: &Job| {
        let status = Command::new(&program).args(&args).status()?;
        if status.success() {
            debug!(job = %job.name(), "command succeeded");
            Ok(Control::Continue)
        } else {
            Err(TracedError::msg(format!("`{program}` exited with {status}")))
        }
    }
}

fn report(timer: &Timer) {
    let m = timer.metrics();
    info!(
        ticks = m.ticks,
        status = %m.status,
        jobs = m.queued_jobs,
        pending = m.pending_dispatch,
        running = m.pool_running,
        waiting = m.pool_waiting,
        dispatched = m.dispatched,
        coalesced = m.coalesced,
        rejected = m.rejected,
        panics = m.worker_panics,
        utilization = m.worker_utilization(),
        "timer metrics"
    );
    for job in timer.jobs() {
        let stats = job.state();
        debug!(
            job = %job.name(),
            status = %stats.status,
            runs = stats.runs,
            failures = stats.failures,
            avg_ms = stats.avg_duration.as_millis() as u64,
            distinct_errors = stats.errors.len(),
            "job stats"
        );
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                error!(error = %e, "failed to register SIGTERM handler");
                if let Err(e) = ctrl_c.await {
                    error!(error = %e, "failed to listen for ctrl_c");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            error!(error = %e, "failed to listen for ctrl_c");
        }
    }
}
