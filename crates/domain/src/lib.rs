pub mod collaborators;
pub mod configuration;
pub mod entities;
pub mod query;
pub mod storage;
pub mod value_objects;

pub use collaborators::*;
pub use configuration::{
    apply_defaults_if_unset, validate_and_populate_job, validate_and_populate_task,
    CronClassification, SanitizedConfiguration,
};
pub use entities::*;
pub use query::TaskQuery;
pub use scheduler_core::{SchedulerError, SchedulerResult};
pub use storage::*;
pub use value_objects::*;
