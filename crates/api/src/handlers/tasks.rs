use std::collections::BTreeSet;

use scheduler_application::validate_lock;
use scheduler_core::SchedulerError;
use scheduler_domain::storage::{self, MutableStoreProvider};
use scheduler_domain::{JobKey, Lock, LockKey, ScheduleStatus, TaskQuery};
use tracing::{info, warn};

use crate::auth::{Capability, SessionKey};
use crate::coordinator::{assert_valid_key, single_role, SchedulerApi};
use crate::error::{ApiError, ApiResult};
use crate::policy::Operation;
use crate::response::Response;

impl SchedulerApi {
    /// 终止查询匹配的任务
    ///
    /// 持有ROOT能力的调用方跳过逐任务的角色校验，但锁校验对每个涉及的作业仍然生效。
    pub async fn kill_tasks(
        &self,
        query: TaskQuery,
        lock: Option<Lock>,
        session: &SessionKey,
    ) -> Response {
        let result = self.try_kill_tasks(query, lock, session).await;
        self.respond(Operation::KillTasks, result).await
    }

    async fn try_kill_tasks(
        &self,
        query: TaskQuery,
        lock: Option<Lock>,
        session: &SessionKey,
    ) -> ApiResult<Response> {
        if let Some(name) = query.job_name.as_deref() {
            if name.trim().is_empty() {
                return Err(ApiError::invalid_request(format!("Invalid job name: '{name}'")));
            }
        }

        let matched = self.state.storage.read_consistent(&query).await?;
        let mut owners: BTreeSet<String> =
            matched.iter().map(|task| task.role().to_string()).collect();
        if let Some(role) = &query.role {
            owners.insert(role.clone());
        }
        let context = self.authorize(Operation::KillTasks, session, &owners)?;
        let is_root = context.has_capability(Capability::Root);

        let audit = format!("Killed by {}", context.identity);
        let identity = &context.identity;
        let state_manager = &self.state.state_manager;
        let killed = storage::write(
            self.state.storage.as_ref(),
            |store: &mut dyn MutableStoreProvider| {
                let tasks = store.task_store().fetch_tasks(&query);

                // 授权之后才出现的其他角色的任务不在本次授权范围内
                if !is_root {
                    let unauthorized: BTreeSet<&str> = tasks
                        .iter()
                        .map(|task| task.role())
                        .filter(|role| !owners.contains(*role))
                        .collect();
                    if !unauthorized.is_empty() {
                        let roles: Vec<&str> = unauthorized.into_iter().collect();
                        return Err(SchedulerError::AuthFailed(format!(
                            "{identity} is not authorized for roles: {}",
                            roles.join(", ")
                        )));
                    }
                }

                // 只对实际匹配到任务的作业做锁校验，任一作业被锁则整体拒绝
                let job_keys: BTreeSet<JobKey> = tasks.iter().map(|task| task.job_key()).collect();
                for key in job_keys {
                    validate_lock(store.as_read_only(), &LockKey::job(key), lock.as_ref())?;
                }
                Ok(state_manager.change_state(store, &query, ScheduleStatus::Killing, Some(audit)))
            },
        )
        .await?;

        if killed == 0 {
            warn!("终止请求没有匹配到任何活跃任务: {:?}", query);
        } else {
            info!("{} 终止了 {} 个任务", context.identity, killed);
        }
        Ok(Response::ok_with_message(format!("Killed {killed} tasks.")))
    }

    pub async fn restart_shards(
        &self,
        key: JobKey,
        shard_ids: BTreeSet<i32>,
        lock: Option<Lock>,
        session: &SessionKey,
    ) -> Response {
        let result = self.try_restart_shards(key, shard_ids, lock, session).await;
        self.respond(Operation::RestartShards, result).await
    }

    async fn try_restart_shards(
        &self,
        key: JobKey,
        shard_ids: BTreeSet<i32>,
        lock: Option<Lock>,
        session: &SessionKey,
    ) -> ApiResult<Response> {
        let context = self.authorize(Operation::RestartShards, session, &single_role(&key.role))?;
        assert_valid_key(&key)?;
        if shard_ids.is_empty() {
            return Err(SchedulerError::schedule("At least one shard must be specified").into());
        }

        let lock_key = LockKey::job(key.clone());
        let audit = format!("Restarted by {}", context.identity);
        let state_manager = &self.state.state_manager;
        let restarted = storage::write(
            self.state.storage.as_ref(),
            |store: &mut dyn MutableStoreProvider| {
                validate_lock(store.as_read_only(), &lock_key, lock.as_ref())?;

                let query = TaskQuery::instance_scoped(&key, shard_ids.iter().copied()).active();
                let active: BTreeSet<i32> = store
                    .task_store()
                    .fetch_tasks(&query)
                    .iter()
                    .map(|task| task.instance_id())
                    .collect();
                let missing: Vec<i32> = shard_ids.difference(&active).copied().collect();
                if !missing.is_empty() {
                    return Err(SchedulerError::schedule(format!(
                        "Not all requested shards are active: {missing:?}"
                    )));
                }
                Ok(state_manager.change_state(store, &query, ScheduleStatus::Restarting, Some(audit)))
            },
        )
        .await?;

        if restarted == 0 {
            warn!("作业 {} 的分片 {:?} 都不处于可重启状态", key, shard_ids);
        } else {
            info!("作业 {} 重启了 {} 个分片", key, restarted);
        }
        Ok(Response::ok_with_message(format!(
            "Shards are restarting. {restarted} of {} shards restarted.",
            shard_ids.len()
        )))
    }

    /// 跳过状态转换表强制设置任务状态，仅限管理员
    pub async fn force_task_state(
        &self,
        task_id: String,
        status: ScheduleStatus,
        session: &SessionKey,
    ) -> Response {
        let result = self.try_force_task_state(task_id, status, session).await;
        self.respond(Operation::ForceTaskState, result).await
    }

    async fn try_force_task_state(
        &self,
        task_id: String,
        status: ScheduleStatus,
        session: &SessionKey,
    ) -> ApiResult<Response> {
        let context = self.authorize(Operation::ForceTaskState, session, &BTreeSet::new())?;

        let audit = format!("Transition forced by {}", context.identity);
        let state_manager = &self.state.state_manager;
        let changed = storage::write(
            self.state.storage.as_ref(),
            |store: &mut dyn MutableStoreProvider| {
                Ok(state_manager.force_state(store, &task_id, status, Some(audit)))
            },
        )
        .await?;

        info!("任务 {} 强制迁移到 {}, 变更 {} 个", task_id, status, changed);
        Ok(Response::ok_with_message("Transition attempted."))
    }
}
