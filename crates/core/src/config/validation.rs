use std::collections::HashSet;
use std::str::FromStr;

use crate::error::ConfigError;

use super::types::{CadenceConfig, JobEntry, TimerConfig};

impl CadenceConfig {
    /// Validate the timer section and every job entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timer.validate()?;
        let mut seen = HashSet::new();
        for job in &self.jobs {
            job.validate()?;
            if !seen.insert(job.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate job name '{}'",
                    job.name
                )));
            }
        }
        Ok(())
    }
}

impl TimerConfig {
    /// Ensure the tick width and cron bound are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "timer.interval_ms must be greater than zero".into(),
            ));
        }
        if self.cron_recheck_ms < self.interval_ms {
            return Err(ConfigError::Invalid(format!(
                "timer.cron_recheck_ms ({}) must be at least one tick ({} ms)",
                self.cron_recheck_ms, self.interval_ms
            )));
        }
        Ok(())
    }
}

impl JobEntry {
    /// Check name, command and that exactly one schedule is given.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("job name must not be empty".into()));
        }
        if self.command.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "job '{}' has an empty command",
                self.name
            )));
        }
        if self.times == Some(0) {
            return Err(ConfigError::Invalid(format!(
                "job '{}' has times = 0 and would never run",
                self.name
            )));
        }
        match (&self.every, &self.cron) {
            (Some(every), None) => {
                if self.every_duration().is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "job '{}' has invalid duration '{every}'",
                        self.name
                    )));
                }
            }
            (None, Some(cron)) => {
                // Field count only; the scheduler parses the full expression.
                let fields = cron.split_whitespace().count();
                if !(5..=7).contains(&fields) {
                    return Err(ConfigError::Invalid(format!(
                        "job '{}' cron '{cron}' must have 5, 6 or 7 fields",
                        self.name
                    )));
                }
            }
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid(format!(
                    "job '{}' sets both 'every' and 'cron'",
                    self.name
                )));
            }
            (None, None) => {
                return Err(ConfigError::Invalid(format!(
                    "job '{}' needs either 'every' or 'cron'",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

impl FromStr for CadenceConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_toml(s)
    }
}
