pub mod config;
pub mod error;
pub mod trace;

pub use config::{load_dotenv, parse_duration, CadenceConfig, JobEntry, TimerConfig};
pub use error::*;
pub use trace::TracedError;
