use std::path::Path;

use crate::error::ConfigError;

use super::types::{CadenceConfig, TimerConfig};

/// Load a `.env` file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

impl CadenceConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.timer.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }
}

impl TimerConfig {
    /// Build timer config from the environment alone (reads `.env` first).
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// Convention: `CADENCE_TIMER_KEY` overrides `timer.key`.
    /// - `CADENCE_TIMER_INTERVAL_MS` -> `timer.interval_ms`
    /// - `CADENCE_TIMER_WORKER_THREADS` -> `timer.worker_threads`
    /// - `CADENCE_TIMER_MAX_IN_FLIGHT` -> `timer.max_in_flight`
    /// - `CADENCE_TIMER_CRON_RECHECK_MS` -> `timer.cron_recheck_ms`
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are
    /// ignored with a warning.
    pub(crate) fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        override_num(&lookup, "CADENCE_TIMER_INTERVAL_MS", &mut self.interval_ms);
        override_num(&lookup, "CADENCE_TIMER_WORKER_THREADS", &mut self.worker_threads);
        override_num(&lookup, "CADENCE_TIMER_MAX_IN_FLIGHT", &mut self.max_in_flight);
        override_num(&lookup, "CADENCE_TIMER_CRON_RECHECK_MS", &mut self.cron_recheck_ms);
    }
}

fn override_num<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    let Some(raw) = lookup(key).filter(|v| !v.is_empty()) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable override"),
    }
}
