//! 各操作的处理逻辑，全部实现为 [`crate::SchedulerApi`] 的方法

pub mod cron;
pub mod jobs;
pub mod locks;
pub mod maintenance;
pub mod quota;
pub mod recovery;
pub mod rewrite;
pub mod summary;
pub mod tasks;

pub use jobs::AddInstancesConfig;
