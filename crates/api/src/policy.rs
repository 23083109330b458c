//! 操作 → 授权要求 的声明式策略表
//!
//! 协调器对每个操作统一查表授权，整个授权契约集中在 [`policy_for`] 一处。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::auth::{AuditCheck, Capability};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    CreateJob,
    ScheduleCronJob,
    DescheduleCronJob,
    ReplaceCronTemplate,
    PopulateJobConfig,
    StartCronJob,
    GetTasksStatus,
    GetRoleSummary,
    GetJobSummary,
    GetJobs,
    KillTasks,
    RestartShards,
    GetQuota,
    SetQuota,
    StartMaintenance,
    DrainHosts,
    MaintenanceStatus,
    EndMaintenance,
    ForceTaskState,
    PerformBackup,
    ListBackups,
    StageRecovery,
    QueryRecovery,
    DeleteRecoveryTasks,
    CommitRecovery,
    UnloadRecovery,
    Snapshot,
    RewriteConfigs,
    GetVersion,
    AddInstances,
    AcquireLock,
    ReleaseLock,
}

impl Operation {
    pub const ALL: [Operation; 32] = [
        Operation::CreateJob,
        Operation::ScheduleCronJob,
        Operation::DescheduleCronJob,
        Operation::ReplaceCronTemplate,
        Operation::PopulateJobConfig,
        Operation::StartCronJob,
        Operation::GetTasksStatus,
        Operation::GetRoleSummary,
        Operation::GetJobSummary,
        Operation::GetJobs,
        Operation::KillTasks,
        Operation::RestartShards,
        Operation::GetQuota,
        Operation::SetQuota,
        Operation::StartMaintenance,
        Operation::DrainHosts,
        Operation::MaintenanceStatus,
        Operation::EndMaintenance,
        Operation::ForceTaskState,
        Operation::PerformBackup,
        Operation::ListBackups,
        Operation::StageRecovery,
        Operation::QueryRecovery,
        Operation::DeleteRecoveryTasks,
        Operation::CommitRecovery,
        Operation::UnloadRecovery,
        Operation::Snapshot,
        Operation::RewriteConfigs,
        Operation::GetVersion,
        Operation::AddInstances,
        Operation::AcquireLock,
        Operation::ReleaseLock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateJob => "createJob",
            Operation::ScheduleCronJob => "scheduleCronJob",
            Operation::DescheduleCronJob => "descheduleCronJob",
            Operation::ReplaceCronTemplate => "replaceCronTemplate",
            Operation::PopulateJobConfig => "populateJobConfig",
            Operation::StartCronJob => "startCronJob",
            Operation::GetTasksStatus => "getTasksStatus",
            Operation::GetRoleSummary => "getRoleSummary",
            Operation::GetJobSummary => "getJobSummary",
            Operation::GetJobs => "getJobs",
            Operation::KillTasks => "killTasks",
            Operation::RestartShards => "restartShards",
            Operation::GetQuota => "getQuota",
            Operation::SetQuota => "setQuota",
            Operation::StartMaintenance => "startMaintenance",
            Operation::DrainHosts => "drainHosts",
            Operation::MaintenanceStatus => "maintenanceStatus",
            Operation::EndMaintenance => "endMaintenance",
            Operation::ForceTaskState => "forceTaskState",
            Operation::PerformBackup => "performBackup",
            Operation::ListBackups => "listBackups",
            Operation::StageRecovery => "stageRecovery",
            Operation::QueryRecovery => "queryRecovery",
            Operation::DeleteRecoveryTasks => "deleteRecoveryTasks",
            Operation::CommitRecovery => "commitRecovery",
            Operation::UnloadRecovery => "unloadRecovery",
            Operation::Snapshot => "snapshot",
            Operation::RewriteConfigs => "rewriteConfigs",
            Operation::GetVersion => "getVersion",
            Operation::AddInstances => "addInstances",
            Operation::AcquireLock => "acquireLock",
            Operation::ReleaseLock => "releaseLock",
        }
    }

    /// 是否会修改集群状态
    pub fn is_mutating(&self) -> bool {
        policy_for(*self) != AuthPolicy::Public
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    /// 只读操作，不需要会话
    Public,
    /// 调用方必须属于作业所属角色
    JobOwner,
    /// 持有ROOT能力的调用方跳过逐任务的角色检查，否则必须属于所有受影响任务的角色之一
    TaskOwnersOrRoot,
    Capability(Capability),
}

impl AuthPolicy {
    /// ROOT级操作的能力检查写审计日志
    pub fn audit(&self) -> AuditCheck {
        match self {
            AuthPolicy::Capability(Capability::Root) | AuthPolicy::TaskOwnersOrRoot => {
                AuditCheck::Required
            }
            _ => AuditCheck::None,
        }
    }
}

pub fn policy_for(operation: Operation) -> AuthPolicy {
    use Operation::*;

    match operation {
        GetTasksStatus | GetRoleSummary | GetJobSummary | GetJobs | GetQuota
        | PopulateJobConfig | GetVersion => AuthPolicy::Public,

        CreateJob | ScheduleCronJob | DescheduleCronJob | ReplaceCronTemplate | StartCronJob
        | AddInstances | RestartShards | AcquireLock | ReleaseLock => AuthPolicy::JobOwner,

        KillTasks => AuthPolicy::TaskOwnersOrRoot,

        SetQuota => AuthPolicy::Capability(Capability::Provisioner),

        StartMaintenance | DrainHosts | MaintenanceStatus | EndMaintenance => {
            AuthPolicy::Capability(Capability::MachineMaintainer)
        }

        ForceTaskState | PerformBackup | ListBackups | StageRecovery | QueryRecovery
        | DeleteRecoveryTasks | CommitRecovery | UnloadRecovery | Snapshot | RewriteConfigs => {
            AuthPolicy::Capability(Capability::Root)
        }
    }
}
