pub mod config;
pub mod errors;
pub mod logging;

pub use config::*;
pub use errors::*;
pub use logging::{init_logging, EventKind, EventRecord, EventTracker, EventTrackerConfig, LogLevel};
