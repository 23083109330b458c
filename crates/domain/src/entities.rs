use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::ResourceAggregate;

/// 作业的稳定标识 (role, environment, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub role: String,
    pub environment: String,
    pub name: String,
}

impl JobKey {
    pub fn new(
        role: impl Into<String>,
        environment: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            environment: environment.into(),
            name: name.into(),
        }
    }

    /// role/environment/name
    pub fn canonical(&self) -> String {
        format!("{}/{}/{}", self.role, self.environment, self.name)
    }

    pub fn is_valid(&self) -> bool {
        is_good_identifier(&self.role)
            && is_good_identifier(&self.environment)
            && is_good_identifier(&self.name)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// 标识符只允许字母、数字、`_`、`-` 和 `.`
pub fn is_good_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// 作业所有者
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    pub role: String,
    pub user: String,
}

impl Identity {
    pub fn new(role: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            user: user.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub name: String,
    pub data: String,
}

/// 单个任务实例的资源与命令模板
///
/// `Option` 字段在原始请求中可以缺省，由配置清洗填充默认值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub owner: Identity,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub job_name: String,
    #[serde(default)]
    pub is_service: Option<bool>,
    pub num_cpus: f64,
    pub ram_mb: i64,
    pub disk_mb: i64,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub max_task_failures: Option<i32>,
    #[serde(default)]
    pub production: Option<bool>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub requested_ports: BTreeSet<String>,
    #[serde(default)]
    pub executor_config: Option<ExecutorConfig>,
}

impl TaskConfig {
    pub fn job_key(&self) -> JobKey {
        JobKey::new(&self.owner.role, &self.environment, &self.job_name)
    }

    pub fn is_production(&self) -> bool {
        self.production.unwrap_or(false)
    }

    pub fn resources(&self) -> ResourceAggregate {
        ResourceAggregate::new(self.num_cpus, self.ram_mb, self.disk_mb)
    }
}

/// 作业模板
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfiguration {
    pub key: JobKey,
    pub owner: Identity,
    #[serde(default)]
    pub cron_schedule: Option<String>,
    pub task_config: TaskConfig,
    pub instance_count: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Init,
    Throttled,
    Pending,
    Assigned,
    Starting,
    Running,
    Preempting,
    Restarting,
    Draining,
    Killing,
    Finished,
    Failed,
    Killed,
    Lost,
}

impl ScheduleStatus {
    pub const ACTIVE_STATES: [ScheduleStatus; 10] = [
        ScheduleStatus::Init,
        ScheduleStatus::Throttled,
        ScheduleStatus::Pending,
        ScheduleStatus::Assigned,
        ScheduleStatus::Starting,
        ScheduleStatus::Running,
        ScheduleStatus::Preempting,
        ScheduleStatus::Restarting,
        ScheduleStatus::Draining,
        ScheduleStatus::Killing,
    ];

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScheduleStatus::Finished
                | ScheduleStatus::Failed
                | ScheduleStatus::Killed
                | ScheduleStatus::Lost
        )
    }

    /// 尚未被放置到主机上的状态
    pub fn is_unassigned(&self) -> bool {
        matches!(
            self,
            ScheduleStatus::Init | ScheduleStatus::Throttled | ScheduleStatus::Pending
        )
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("{self:?}"));
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub timestamp_ms: i64,
    pub status: ScheduleStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub scheduler: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedTask {
    pub task_id: String,
    #[serde(default)]
    pub slave_id: Option<String>,
    #[serde(default)]
    pub slave_host: Option<String>,
    pub task: TaskConfig,
    #[serde(default)]
    pub assigned_ports: BTreeMap<String, i32>,
    pub instance_id: i32,
}

/// 一个运行中或等待中的任务实例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub assigned_task: AssignedTask,
    pub status: ScheduleStatus,
    #[serde(default)]
    pub failure_count: i32,
    #[serde(default)]
    pub task_events: Vec<TaskEvent>,
    #[serde(default)]
    pub ancestor_id: Option<String>,
}

impl ScheduledTask {
    pub fn task_id(&self) -> &str {
        &self.assigned_task.task_id
    }

    pub fn job_key(&self) -> JobKey {
        self.assigned_task.task.job_key()
    }

    pub fn role(&self) -> &str {
        &self.assigned_task.task.owner.role
    }

    pub fn instance_id(&self) -> i32 {
        self.assigned_task.instance_id
    }

    /// 新建一个PENDING状态的任务实例，附带一条初始状态事件
    pub fn pending(task: TaskConfig, instance_id: i32, now_ms: i64) -> Self {
        let task_id = generate_task_id(&task, instance_id, now_ms);
        Self {
            assigned_task: AssignedTask {
                task_id,
                slave_id: None,
                slave_host: None,
                task,
                assigned_ports: BTreeMap::new(),
                instance_id,
            },
            status: ScheduleStatus::Pending,
            failure_count: 0,
            task_events: vec![TaskEvent {
                timestamp_ms: now_ms,
                status: ScheduleStatus::Pending,
                message: None,
                scheduler: None,
            }],
            ancestor_id: None,
        }
    }

    /// 最近一次状态事件的时间，没有事件时为0
    pub fn latest_event_ms(&self) -> i64 {
        self.task_events
            .last()
            .map(|event| event.timestamp_ms)
            .unwrap_or(0)
    }
}

/// 任务ID: 时间戳-角色-环境-作业名-实例号-随机后缀
fn generate_task_id(task: &TaskConfig, instance_id: i32, now_ms: i64) -> String {
    format!(
        "{}-{}-{}-{}-{}-{}",
        now_ms,
        task.owner.role,
        task.environment,
        task.job_name,
        instance_id,
        Uuid::new_v4()
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    pub job_key: JobKey,
    pub instance_id: i32,
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.job_key, self.instance_id)
    }
}

/// 锁作用的资源，目前只支持作业级别
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "key", rename_all = "snake_case")]
pub enum LockKey {
    Job(JobKey),
}

impl LockKey {
    pub fn job(key: JobKey) -> Self {
        LockKey::Job(key)
    }

    /// 锁所属的角色，用于认证
    pub fn role(&self) -> &str {
        match self {
            LockKey::Job(key) => &key.role,
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Job(key) => write!(f, "{key}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub key: LockKey,
    pub token: String,
    pub user: String,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub message: Option<String>,
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Lock(key: {}, token: {}, user: {}, timestamp: {})",
            self.key, self.token, self.user, self.timestamp_ms
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockValidation {
    Checked,
    Unchecked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfigRewrite {
    pub old_job: JobConfiguration,
    pub rewritten_job: JobConfiguration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfigRewrite {
    pub instance_key: InstanceKey,
    pub old_task: TaskConfig,
    pub rewritten_task: TaskConfig,
}

/// 管理员CAS重写命令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RewriteCommand {
    JobRewrite(JobConfigRewrite),
    InstanceRewrite(InstanceConfigRewrite),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaintenanceMode {
    None,
    Scheduled,
    Draining,
    Drained,
}
