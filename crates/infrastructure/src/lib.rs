pub mod backup;
pub mod cron;
pub mod maintenance;
pub mod memory_storage;

pub use backup::InMemoryBackup;
pub use cron::{parse_schedule, CronExpressionPredictor, StorageCronJobManager, CRON_MANAGER_ID};
pub use maintenance::InMemoryMaintenanceController;
pub use memory_storage::{MemStorage, StoreState};
