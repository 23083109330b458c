//! 请求信封与分发
//!
//! 线上的可选字段（会话、锁、角色过滤）在这里统一归一化，处理逻辑只接收明确的类型。

use std::collections::BTreeSet;

use scheduler_domain::{
    JobConfiguration, JobKey, Lock, LockKey, LockValidation, ResourceAggregate, RewriteCommand,
    ScheduleStatus, TaskQuery,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{AuthError, SessionKey};
use crate::coordinator::SchedulerApi;
use crate::handlers::AddInstancesConfig;
use crate::policy::Operation;
use crate::response::Response;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Request {
    CreateJob {
        job: JobConfiguration,
        #[serde(default)]
        lock: Option<Lock>,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    ScheduleCronJob {
        job: JobConfiguration,
        #[serde(default)]
        lock: Option<Lock>,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    DescheduleCronJob {
        key: JobKey,
        #[serde(default)]
        lock: Option<Lock>,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    ReplaceCronTemplate {
        job: JobConfiguration,
        #[serde(default)]
        lock: Option<Lock>,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    PopulateJobConfig {
        job: JobConfiguration,
    },
    StartCronJob {
        key: JobKey,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    GetTasksStatus {
        #[serde(default)]
        query: TaskQuery,
    },
    GetRoleSummary,
    GetJobSummary {
        #[serde(default)]
        role: Option<String>,
    },
    GetJobs {
        #[serde(default)]
        role: Option<String>,
    },
    KillTasks {
        query: TaskQuery,
        #[serde(default)]
        lock: Option<Lock>,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    RestartShards {
        key: JobKey,
        shard_ids: BTreeSet<i32>,
        #[serde(default)]
        lock: Option<Lock>,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    GetQuota {
        role: String,
    },
    SetQuota {
        role: String,
        quota: ResourceAggregate,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    StartMaintenance {
        hosts: BTreeSet<String>,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    DrainHosts {
        hosts: BTreeSet<String>,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    MaintenanceStatus {
        hosts: BTreeSet<String>,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    EndMaintenance {
        hosts: BTreeSet<String>,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    ForceTaskState {
        task_id: String,
        status: ScheduleStatus,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    PerformBackup {
        #[serde(default)]
        session: Option<SessionKey>,
    },
    ListBackups {
        #[serde(default)]
        session: Option<SessionKey>,
    },
    StageRecovery {
        backup_id: String,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    QueryRecovery {
        #[serde(default)]
        query: TaskQuery,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    DeleteRecoveryTasks {
        query: TaskQuery,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    CommitRecovery {
        #[serde(default)]
        session: Option<SessionKey>,
    },
    UnloadRecovery {
        #[serde(default)]
        session: Option<SessionKey>,
    },
    Snapshot {
        #[serde(default)]
        session: Option<SessionKey>,
    },
    RewriteConfigs {
        commands: Vec<RewriteCommand>,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    GetVersion,
    AddInstances {
        config: AddInstancesConfig,
        #[serde(default)]
        lock: Option<Lock>,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    AcquireLock {
        lock_key: LockKey,
        #[serde(default)]
        session: Option<SessionKey>,
    },
    ReleaseLock {
        lock: Lock,
        validation: LockValidation,
        #[serde(default)]
        session: Option<SessionKey>,
    },
}

impl Request {
    pub fn operation(&self) -> Operation {
        match self {
            Request::CreateJob { .. } => Operation::CreateJob,
            Request::ScheduleCronJob { .. } => Operation::ScheduleCronJob,
            Request::DescheduleCronJob { .. } => Operation::DescheduleCronJob,
            Request::ReplaceCronTemplate { .. } => Operation::ReplaceCronTemplate,
            Request::PopulateJobConfig { .. } => Operation::PopulateJobConfig,
            Request::StartCronJob { .. } => Operation::StartCronJob,
            Request::GetTasksStatus { .. } => Operation::GetTasksStatus,
            Request::GetRoleSummary => Operation::GetRoleSummary,
            Request::GetJobSummary { .. } => Operation::GetJobSummary,
            Request::GetJobs { .. } => Operation::GetJobs,
            Request::KillTasks { .. } => Operation::KillTasks,
            Request::RestartShards { .. } => Operation::RestartShards,
            Request::GetQuota { .. } => Operation::GetQuota,
            Request::SetQuota { .. } => Operation::SetQuota,
            Request::StartMaintenance { .. } => Operation::StartMaintenance,
            Request::DrainHosts { .. } => Operation::DrainHosts,
            Request::MaintenanceStatus { .. } => Operation::MaintenanceStatus,
            Request::EndMaintenance { .. } => Operation::EndMaintenance,
            Request::ForceTaskState { .. } => Operation::ForceTaskState,
            Request::PerformBackup { .. } => Operation::PerformBackup,
            Request::ListBackups { .. } => Operation::ListBackups,
            Request::StageRecovery { .. } => Operation::StageRecovery,
            Request::QueryRecovery { .. } => Operation::QueryRecovery,
            Request::DeleteRecoveryTasks { .. } => Operation::DeleteRecoveryTasks,
            Request::CommitRecovery { .. } => Operation::CommitRecovery,
            Request::UnloadRecovery { .. } => Operation::UnloadRecovery,
            Request::Snapshot { .. } => Operation::Snapshot,
            Request::RewriteConfigs { .. } => Operation::RewriteConfigs,
            Request::GetVersion => Operation::GetVersion,
            Request::AddInstances { .. } => Operation::AddInstances,
            Request::AcquireLock { .. } => Operation::AcquireLock,
            Request::ReleaseLock { .. } => Operation::ReleaseLock,
        }
    }
}

/// 缺少会话时直接以AUTH_FAILED拒绝，不进入处理逻辑
macro_rules! with_session {
    ($api:expr, $operation:expr, $session:expr, |$key:ident| $call:expr) => {
        match $session {
            Some($key) => $call,
            None => {
                $api
                    .respond($operation, Err(AuthError::MissingCredentials.into()))
                    .await
            }
        }
    };
}

impl SchedulerApi {
    pub async fn dispatch(&self, request: Request) -> Response {
        let operation = request.operation();
        debug!("分发请求: {}", operation);

        match request {
            Request::CreateJob { job, lock, session } => {
                with_session!(self, operation, session, |key| self
                    .create_job(job, lock, &key)
                    .await)
            }
            Request::ScheduleCronJob { job, lock, session } => {
                with_session!(self, operation, session, |key| self
                    .schedule_cron_job(job, lock, &key)
                    .await)
            }
            Request::DescheduleCronJob {
                key: job_key,
                lock,
                session,
            } => with_session!(self, operation, session, |key| self
                .deschedule_cron_job(job_key, lock, &key)
                .await),
            Request::ReplaceCronTemplate { job, lock, session } => {
                with_session!(self, operation, session, |key| self
                    .replace_cron_template(job, lock, &key)
                    .await)
            }
            Request::PopulateJobConfig { job } => self.populate_job_config(job).await,
            Request::StartCronJob {
                key: job_key,
                session,
            } => with_session!(self, operation, session, |key| self
                .start_cron_job(job_key, &key)
                .await),
            Request::GetTasksStatus { query } => self.get_tasks_status(query).await,
            Request::GetRoleSummary => self.get_role_summary().await,
            Request::GetJobSummary { role } => self.get_job_summary(role).await,
            Request::GetJobs { role } => self.get_jobs(role).await,
            Request::KillTasks {
                query,
                lock,
                session,
            } => with_session!(self, operation, session, |key| self
                .kill_tasks(query, lock, &key)
                .await),
            Request::RestartShards {
                key: job_key,
                shard_ids,
                lock,
                session,
            } => with_session!(self, operation, session, |key| self
                .restart_shards(job_key, shard_ids, lock, &key)
                .await),
            Request::GetQuota { role } => self.get_quota(role).await,
            Request::SetQuota {
                role,
                quota,
                session,
            } => with_session!(self, operation, session, |key| self
                .set_quota(role, quota, &key)
                .await),
            Request::StartMaintenance { hosts, session } => {
                with_session!(self, operation, session, |key| self
                    .start_maintenance(hosts, &key)
                    .await)
            }
            Request::DrainHosts { hosts, session } => {
                with_session!(self, operation, session, |key| self
                    .drain_hosts(hosts, &key)
                    .await)
            }
            Request::MaintenanceStatus { hosts, session } => {
                with_session!(self, operation, session, |key| self
                    .maintenance_status(hosts, &key)
                    .await)
            }
            Request::EndMaintenance { hosts, session } => {
                with_session!(self, operation, session, |key| self
                    .end_maintenance(hosts, &key)
                    .await)
            }
            Request::ForceTaskState {
                task_id,
                status,
                session,
            } => with_session!(self, operation, session, |key| self
                .force_task_state(task_id, status, &key)
                .await),
            Request::PerformBackup { session } => {
                with_session!(self, operation, session, |key| self.perform_backup(&key).await)
            }
            Request::ListBackups { session } => {
                with_session!(self, operation, session, |key| self.list_backups(&key).await)
            }
            Request::StageRecovery { backup_id, session } => {
                with_session!(self, operation, session, |key| self
                    .stage_recovery(backup_id, &key)
                    .await)
            }
            Request::QueryRecovery { query, session } => {
                with_session!(self, operation, session, |key| self
                    .query_recovery(query, &key)
                    .await)
            }
            Request::DeleteRecoveryTasks { query, session } => {
                with_session!(self, operation, session, |key| self
                    .delete_recovery_tasks(query, &key)
                    .await)
            }
            Request::CommitRecovery { session } => {
                with_session!(self, operation, session, |key| self.commit_recovery(&key).await)
            }
            Request::UnloadRecovery { session } => {
                with_session!(self, operation, session, |key| self.unload_recovery(&key).await)
            }
            Request::Snapshot { session } => {
                with_session!(self, operation, session, |key| self.snapshot(&key).await)
            }
            Request::RewriteConfigs { commands, session } => {
                with_session!(self, operation, session, |key| self
                    .rewrite_configs(commands, &key)
                    .await)
            }
            Request::GetVersion => self.get_version().await,
            Request::AddInstances {
                config,
                lock,
                session,
            } => with_session!(self, operation, session, |key| self
                .add_instances(config, lock, &key)
                .await),
            Request::AcquireLock { lock_key, session } => {
                with_session!(self, operation, session, |key| self
                    .acquire_lock(lock_key, &key)
                    .await)
            }
            Request::ReleaseLock {
                lock,
                validation,
                session,
            } => with_session!(self, operation, session, |key| self
                .release_lock(lock, validation, &key)
                .await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tagged_request() {
        let request: Request = serde_json::from_str(
            r#"{"op":"getQuota","role":"www-data"}"#,
        )
        .unwrap();
        assert_eq!(request.operation(), Operation::GetQuota);

        let request: Request = serde_json::from_str(r#"{"op":"getVersion"}"#).unwrap();
        assert_eq!(request, Request::GetVersion);
    }

    #[test]
    fn test_optional_fields_default_to_none() {
        let request: Request = serde_json::from_str(
            r#"{"op":"startCronJob","key":{"role":"r","environment":"e","name":"n"}}"#,
        )
        .unwrap();
        match request {
            Request::StartCronJob { key, session } => {
                assert_eq!(key, JobKey::new("r", "e", "n"));
                assert!(session.is_none());
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_session_and_lock_validation_parse() {
        let request: Request = serde_json::from_value(serde_json::json!({
            "op": "releaseLock",
            "lock": {
                "key": {"type": "job", "key": {"role": "r", "environment": "e", "name": "n"}},
                "token": "t",
                "user": "alice",
                "timestamp_ms": 1
            },
            "validation": "UNCHECKED",
            "session": {"kind": "api_key", "value": "secret"}
        }))
        .unwrap();
        assert_eq!(request.operation(), Operation::ReleaseLock);
        match request {
            Request::ReleaseLock {
                validation,
                session,
                ..
            } => {
                assert_eq!(validation, LockValidation::Unchecked);
                assert_eq!(session, Some(SessionKey::ApiKey("secret".to_string())));
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }
}
