//! 变更控制核心之外的协作者接口

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use scheduler_core::SchedulerResult;

use crate::configuration::SanitizedConfiguration;
use crate::entities::{JobConfiguration, JobKey, MaintenanceMode, ScheduledTask};
use crate::query::TaskQuery;

/// cron作业管理器
///
/// 所有操作失败时返回 [`scheduler_core::SchedulerError::Cron`]。
#[async_trait]
pub trait CronJobManager: Send + Sync {
    /// 在作业存储中保存cron模板时使用的管理器ID
    fn manager_id(&self) -> &str;

    async fn has_job(&self, key: &JobKey) -> SchedulerResult<bool>;

    async fn create_job(&self, job: SanitizedConfiguration) -> SchedulerResult<()>;

    async fn update_job(&self, job: SanitizedConfiguration) -> SchedulerResult<()>;

    /// 返回作业是否存在并已被删除
    async fn delete_job(&self, key: &JobKey) -> SchedulerResult<bool>;

    async fn start_job_now(&self, key: &JobKey) -> SchedulerResult<()>;

    async fn get_jobs(&self) -> SchedulerResult<Vec<JobConfiguration>>;
}

/// cron表达式的下次运行时间预测
pub trait CronPredictor: Send + Sync {
    fn predict_next_run(&self, schedule: &str) -> Option<i64>;
}

pub type HostStatuses = BTreeMap<String, MaintenanceMode>;

#[async_trait]
pub trait MaintenanceController: Send + Sync {
    async fn start_maintenance(&self, hosts: &BTreeSet<String>) -> SchedulerResult<HostStatuses>;

    async fn drain(&self, hosts: &BTreeSet<String>) -> SchedulerResult<HostStatuses>;

    async fn get_status(&self, hosts: &BTreeSet<String>) -> SchedulerResult<HostStatuses>;

    async fn end_maintenance(&self, hosts: &BTreeSet<String>) -> SchedulerResult<HostStatuses>;
}

#[async_trait]
pub trait StorageBackup: Send + Sync {
    /// 立即备份，返回备份ID
    async fn backup_now(&self) -> SchedulerResult<String>;
}

/// 从备份恢复
///
/// 先 `stage` 一个备份，再对暂存副本查询或删除任务，最后 `commit` 替换线上状态
/// 或 `unload` 丢弃暂存副本。失败时返回 [`scheduler_core::SchedulerError::Recovery`]。
#[async_trait]
pub trait Recovery: Send + Sync {
    async fn list_backups(&self) -> SchedulerResult<Vec<String>>;

    async fn stage(&self, backup_id: &str) -> SchedulerResult<()>;

    async fn query(&self, query: &TaskQuery) -> SchedulerResult<Vec<ScheduledTask>>;

    async fn delete_tasks(&self, query: &TaskQuery) -> SchedulerResult<()>;

    async fn commit(&self) -> SchedulerResult<()>;

    async fn unload(&self) -> SchedulerResult<()>;
}
