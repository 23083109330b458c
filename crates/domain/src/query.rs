use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::entities::{JobKey, ScheduleStatus, ScheduledTask};

/// 任务查询条件
///
/// 所有字段都是可选约束：`None` 或空集合表示不限制该维度。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskQuery {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub task_ids: BTreeSet<String>,
    #[serde(default)]
    pub statuses: BTreeSet<ScheduleStatus>,
    #[serde(default)]
    pub instance_ids: BTreeSet<i32>,
    #[serde(default)]
    pub slave_host: Option<String>,
}

impl TaskQuery {
    pub fn unscoped() -> Self {
        Self::default()
    }

    pub fn role_scoped(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            ..Self::default()
        }
    }

    pub fn job_scoped(key: &JobKey) -> Self {
        Self {
            role: Some(key.role.clone()),
            environment: Some(key.environment.clone()),
            job_name: Some(key.name.clone()),
            ..Self::default()
        }
    }

    pub fn instance_scoped(key: &JobKey, instance_ids: impl IntoIterator<Item = i32>) -> Self {
        Self::job_scoped(key).by_instances(instance_ids)
    }

    pub fn task_scoped(task_ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            task_ids: task_ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn by_instances(mut self, instance_ids: impl IntoIterator<Item = i32>) -> Self {
        self.instance_ids = instance_ids.into_iter().collect();
        self
    }

    pub fn by_status(mut self, statuses: impl IntoIterator<Item = ScheduleStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn by_slave_host(mut self, host: impl Into<String>) -> Self {
        self.slave_host = Some(host.into());
        self
    }

    /// 只匹配活跃状态的任务
    pub fn active(self) -> Self {
        self.by_status(ScheduleStatus::ACTIVE_STATES)
    }

    /// 查询是否精确指向一个作业
    pub fn job_key(&self) -> Option<JobKey> {
        match (&self.role, &self.environment, &self.job_name) {
            (Some(role), Some(environment), Some(name)) => {
                Some(JobKey::new(role, environment, name))
            }
            _ => None,
        }
    }

    pub fn matches(&self, task: &ScheduledTask) -> bool {
        let config = &task.assigned_task.task;

        if let Some(role) = &self.role {
            if &config.owner.role != role {
                return false;
            }
        }
        if let Some(environment) = &self.environment {
            if &config.environment != environment {
                return false;
            }
        }
        if let Some(job_name) = &self.job_name {
            if &config.job_name != job_name {
                return false;
            }
        }
        if !self.task_ids.is_empty() && !self.task_ids.contains(task.task_id()) {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&task.status) {
            return false;
        }
        if !self.instance_ids.is_empty() && !self.instance_ids.contains(&task.instance_id()) {
            return false;
        }
        if let Some(host) = &self.slave_host {
            if task.assigned_task.slave_host.as_deref() != Some(host.as_str()) {
                return false;
            }
        }
        true
    }
}
