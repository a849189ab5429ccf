//! Timer and job-manifest configuration.
//!
//! Parsed from TOML with `CADENCE_*` environment overrides applied on top.
//! Split into focused submodules:
//! - `types`: config structs and their defaults
//! - `loading`: TOML/file/env entry points and overrides
//! - `validation`: semantic checks run after every load
//! - `duration`: human duration strings ("1h30m", "250ms")

mod duration;
mod loading;
mod types;
mod validation;

#[cfg(test)]
mod tests;

pub use duration::parse_duration;
pub use loading::load_dotenv;
pub use types::{CadenceConfig, JobEntry, TimerConfig};
