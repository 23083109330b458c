//! 作业配置清洗
//!
//! 校验原始作业描述、填充默认值，并把单个任务模板展开为每个实例一份配置。
//! 清洗是输入的纯函数：相同输入总是得到相同输出，可安全重试。

use std::collections::BTreeMap;

use scheduler_core::{SchedulerError, SchedulerResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::entities::{is_good_identifier, JobConfiguration, TaskConfig};

pub const DEFAULT_PRIORITY: i32 = 0;
pub const DEFAULT_MAX_TASK_FAILURES: i32 = 1;
pub const DEFAULT_IS_SERVICE: bool = false;
pub const DEFAULT_PRODUCTION: bool = false;

/// 旧版客户端用空字符串表示"没有cron"时返回给调用方的警告
pub const EMPTY_CRON_SCHEDULE_WARNING: &str =
    "Empty cron schedule is treated as no cron schedule. This is deprecated and will be rejected in a future release.";

/// 作业的cron分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CronClassification {
    NotCron,
    Cron,
    /// 旧版客户端兼容：显式的空字符串视为非cron作业，并附带弃用警告
    LegacyEmptySchedule,
}

impl CronClassification {
    pub fn classify(schedule: Option<&str>) -> Self {
        match schedule {
            None => CronClassification::NotCron,
            Some("") => CronClassification::LegacyEmptySchedule,
            Some(_) => CronClassification::Cron,
        }
    }
}

/// 通过校验的作业配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizedConfiguration {
    pub job_config: JobConfiguration,
    pub task_configs: BTreeMap<i32, TaskConfig>,
    pub cron: CronClassification,
    pub warnings: Vec<String>,
}

impl SanitizedConfiguration {
    pub fn from_unsanitized(job: JobConfiguration) -> SchedulerResult<Self> {
        let job_config = validate_and_populate_job(job)?;

        let cron = CronClassification::classify(job_config.cron_schedule.as_deref());
        let mut warnings = Vec::new();
        if cron == CronClassification::LegacyEmptySchedule {
            warn!(
                "作业 {} 的cron表达式为空字符串，按非cron作业处理",
                job_config.key
            );
            warnings.push(EMPTY_CRON_SCHEDULE_WARNING.to_string());
        }

        let task_configs = (0..job_config.instance_count)
            .map(|instance_id| (instance_id, job_config.task_config.clone()))
            .collect();

        Ok(Self {
            job_config,
            task_configs,
            cron,
            warnings,
        })
    }

    pub fn is_cron_job(&self) -> bool {
        self.cron == CronClassification::Cron
    }
}

/// 校验作业配置并填充默认值
pub fn validate_and_populate_job(mut job: JobConfiguration) -> SchedulerResult<JobConfiguration> {
    if !job.key.is_valid() {
        return Err(SchedulerError::task_description(format!(
            "Job key {} is invalid: role, environment and name must match [\\w\\-.]+",
            job.key
        )));
    }
    if job.owner.role.trim().is_empty() {
        return Err(SchedulerError::task_description("Job owner role must be set"));
    }
    if job.owner.user.trim().is_empty() {
        return Err(SchedulerError::task_description("Job owner user must be set"));
    }
    if job.owner.role != job.key.role {
        return Err(SchedulerError::task_description(format!(
            "Role in job key {} does not match owner role {}",
            job.key, job.owner.role
        )));
    }
    if job.instance_count <= 0 {
        return Err(SchedulerError::task_description(format!(
            "Instance count must be positive, got {}",
            job.instance_count
        )));
    }

    // 任务模板的身份字段以作业为准
    job.task_config.owner = job.owner.clone();
    job.task_config.environment = job.key.environment.clone();
    job.task_config.job_name = job.key.name.clone();
    job.task_config = validate_and_populate_task(job.task_config)?;

    Ok(job)
}

/// 校验单个任务配置并填充默认值
pub fn validate_and_populate_task(task: TaskConfig) -> SchedulerResult<TaskConfig> {
    if task.owner.role.trim().is_empty() || task.owner.user.trim().is_empty() {
        return Err(SchedulerError::task_description(
            "Task owner role and user must be set",
        ));
    }
    if !is_good_identifier(&task.environment) {
        return Err(SchedulerError::task_description(format!(
            "Task environment {:?} is invalid",
            task.environment
        )));
    }
    if !is_good_identifier(&task.job_name) {
        return Err(SchedulerError::task_description(format!(
            "Task job name {:?} is invalid",
            task.job_name
        )));
    }
    if task.num_cpus.is_nan() || task.num_cpus <= 0.0 {
        return Err(SchedulerError::task_description(format!(
            "num_cpus must be positive, got {}",
            task.num_cpus
        )));
    }
    if task.ram_mb <= 0 {
        return Err(SchedulerError::task_description(format!(
            "ram_mb must be positive, got {}",
            task.ram_mb
        )));
    }
    if task.disk_mb <= 0 {
        return Err(SchedulerError::task_description(format!(
            "disk_mb must be positive, got {}",
            task.disk_mb
        )));
    }
    if let Some(max_failures) = task.max_task_failures {
        if max_failures == 0 || max_failures < -1 {
            return Err(SchedulerError::task_description(format!(
                "max_task_failures must be -1 or positive, got {max_failures}"
            )));
        }
    }
    match &task.executor_config {
        None => {
            return Err(SchedulerError::task_description(
                "Executor config must be set",
            ))
        }
        Some(executor) if executor.name.trim().is_empty() => {
            return Err(SchedulerError::task_description(
                "Executor name must be set",
            ))
        }
        Some(_) => {}
    }
    if let Some(port) = task
        .requested_ports
        .iter()
        .find(|port| !is_good_identifier(port))
    {
        return Err(SchedulerError::task_description(format!(
            "Requested port name {port:?} is invalid"
        )));
    }

    Ok(apply_defaults_if_unset(task))
}

pub fn apply_defaults_if_unset(mut task: TaskConfig) -> TaskConfig {
    task.priority.get_or_insert(DEFAULT_PRIORITY);
    task.max_task_failures.get_or_insert(DEFAULT_MAX_TASK_FAILURES);
    task.is_service.get_or_insert(DEFAULT_IS_SERVICE);
    task.production.get_or_insert(DEFAULT_PRODUCTION);
    task
}
