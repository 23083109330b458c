use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use cron::Schedule;
use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::storage::{self, MutableStoreProvider, Storage};
use scheduler_domain::{
    CronJobManager, CronPredictor, JobConfiguration, JobKey, SanitizedConfiguration,
    ScheduledTask, TaskQuery,
};
use tracing::{debug, info};

/// cron模板在作业存储中的管理器ID
pub const CRON_MANAGER_ID: &str = "CRON";

/// 解析cron表达式
///
/// 接受标准5字段crontab（分 时 日 月 周），自动补齐秒字段；6或7字段按原样解析。
pub fn parse_schedule(expr: &str) -> SchedulerResult<Schedule> {
    let trimmed = expr.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };

    Schedule::from_str(&normalized)
        .map_err(|e| SchedulerError::cron(format!("Invalid cron schedule '{expr}': {e}")))
}

/// 基于 `cron` crate 的下次运行时间预测
#[derive(Debug, Clone, Default)]
pub struct CronExpressionPredictor;

impl CronPredictor for CronExpressionPredictor {
    fn predict_next_run(&self, schedule: &str) -> Option<i64> {
        let schedule = parse_schedule(schedule).ok()?;
        schedule
            .after(&Utc::now())
            .next()
            .map(|next| next.timestamp_millis())
    }
}

/// 把cron模板保存在作业存储中的cron作业管理器
pub struct StorageCronJobManager {
    storage: Arc<dyn Storage>,
}

impl StorageCronJobManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn cron_template(job: &SanitizedConfiguration) -> SchedulerResult<JobConfiguration> {
        let schedule = job
            .job_config
            .cron_schedule
            .as_deref()
            .filter(|_| job.is_cron_job())
            .ok_or_else(|| {
                SchedulerError::cron(format!("Job {} has no cron schedule", job.job_config.key))
            })?;
        parse_schedule(schedule)?;
        Ok(job.job_config.clone())
    }
}

#[async_trait]
impl CronJobManager for StorageCronJobManager {
    fn manager_id(&self) -> &str {
        CRON_MANAGER_ID
    }

    async fn has_job(&self, key: &JobKey) -> SchedulerResult<bool> {
        storage::consistent_read(self.storage.as_ref(), |store| {
            Ok(store.job_store().fetch_job(CRON_MANAGER_ID, key).is_some())
        })
        .await
    }

    async fn create_job(&self, job: SanitizedConfiguration) -> SchedulerResult<()> {
        let template = Self::cron_template(&job)?;
        let key = template.key.clone();
        storage::write(self.storage.as_ref(), |store: &mut dyn MutableStoreProvider| {
            if store.job_store().fetch_job(CRON_MANAGER_ID, &key).is_some() {
                return Err(SchedulerError::cron(format!("Job already exists: {key}")));
            }
            store.job_store_mut().save_accepted_job(CRON_MANAGER_ID, template);
            Ok(())
        })
        .await?;
        info!("cron作业已创建: {}", key);
        Ok(())
    }

    async fn update_job(&self, job: SanitizedConfiguration) -> SchedulerResult<()> {
        let template = Self::cron_template(&job)?;
        let key = template.key.clone();
        storage::write(self.storage.as_ref(), |store: &mut dyn MutableStoreProvider| {
            if store.job_store().fetch_job(CRON_MANAGER_ID, &key).is_none() {
                return Err(SchedulerError::cron(format!("No such cron job: {key}")));
            }
            store.job_store_mut().save_accepted_job(CRON_MANAGER_ID, template);
            Ok(())
        })
        .await?;
        info!("cron作业模板已更新: {}", key);
        Ok(())
    }

    async fn delete_job(&self, key: &JobKey) -> SchedulerResult<bool> {
        let removed = storage::write(self.storage.as_ref(), |store: &mut dyn MutableStoreProvider| {
            let exists = store.job_store().fetch_job(CRON_MANAGER_ID, key).is_some();
            if exists {
                store.job_store_mut().remove_job(key);
            }
            Ok(exists)
        })
        .await?;
        if removed {
            info!("cron作业已删除: {}", key);
        }
        Ok(removed)
    }

    async fn start_job_now(&self, key: &JobKey) -> SchedulerResult<()> {
        let now_ms = Utc::now().timestamp_millis();
        let launched = storage::write(self.storage.as_ref(), |store: &mut dyn MutableStoreProvider| {
            let template = store
                .job_store()
                .fetch_job(CRON_MANAGER_ID, key)
                .ok_or_else(|| SchedulerError::cron(format!("No such cron job: {key}")))?;

            let active = store
                .task_store()
                .fetch_tasks(&TaskQuery::job_scoped(key).active());
            if !active.is_empty() {
                return Err(SchedulerError::cron(format!(
                    "Job {key} already has {} active tasks",
                    active.len()
                )));
            }

            let sanitized = SanitizedConfiguration::from_unsanitized(template)
                .map_err(|e| SchedulerError::cron(e.to_string()))?;
            let tasks: Vec<ScheduledTask> = sanitized
                .task_configs
                .into_iter()
                .map(|(instance_id, config)| ScheduledTask::pending(config, instance_id, now_ms))
                .collect();
            let count = tasks.len();
            store.task_store_mut().save_tasks(tasks);
            Ok(count)
        })
        .await?;

        info!("cron作业 {} 已手动触发, 启动 {} 个任务", key, launched);
        Ok(())
    }

    async fn get_jobs(&self) -> SchedulerResult<Vec<JobConfiguration>> {
        let jobs = storage::weakly_consistent_read(self.storage.as_ref(), |store| {
            Ok(store.job_store().fetch_jobs(CRON_MANAGER_ID))
        })
        .await?;
        debug!("当前共有 {} 个cron作业", jobs.len());
        Ok(jobs)
    }
}
