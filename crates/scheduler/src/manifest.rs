//! Turning configured [`JobEntry`] records into [`JobOptions`].

use cadence_core::JobEntry;

use crate::error::SchedulerError;
use crate::job::JobOptions;

/// Options for `entry` without a callback; the caller supplies one.
pub fn job_options(entry: &JobEntry) -> Result<JobOptions, SchedulerError> {
    let mut opts = match (&entry.every, &entry.cron) {
        (Some(every), None) => {
            let every = entry.every_duration().ok_or_else(|| {
                SchedulerError::InvalidInterval(format!("job '{}': every = '{every}'", entry.name))
            })?;
            JobOptions::every(every)
        }
        (None, Some(pattern)) => JobOptions::cron(pattern.as_str()),
        _ => {
            return Err(SchedulerError::InvalidInterval(format!(
                "job '{}' must set exactly one of `every` or `cron`",
                entry.name
            )))
        }
    };

    opts = opts.name(entry.name.as_str());
    if entry.singleton {
        opts = opts.singleton();
    }
    if let Some(times) = entry.times {
        opts = opts.times(times);
    }
    if entry.paused {
        opts = opts.paused();
    }
    Ok(opts)
}
