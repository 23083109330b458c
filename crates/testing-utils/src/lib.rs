//! # Scheduler Testing Utils
//!
//! Shared testing utilities for the cluster scheduler workspace: builders for
//! job and task configurations, and helpers that seed an in-memory storage.
//!
//! ```toml
//! [dev-dependencies]
//! scheduler-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;

pub use builders::*;
pub use helpers::*;
