//! 管理员CAS重写
//!
//! 一批命令在同一个写事务中执行。单条命令的失败只被收集，不影响其他命令；
//! 新配置本身无法通过校验时视为请求构造错误，整批回滚。

use std::collections::BTreeSet;

use scheduler_core::{EventKind, SchedulerError, SchedulerResult};
use scheduler_domain::storage::{self, MutableStoreProvider};
use scheduler_domain::{
    validate_and_populate_job, validate_and_populate_task, InstanceConfigRewrite,
    JobConfigRewrite, RewriteCommand, TaskQuery,
};
use tracing::{info, warn};

use crate::auth::SessionKey;
use crate::coordinator::SchedulerApi;
use crate::error::ApiResult;
use crate::policy::Operation;
use crate::response::{Response, ResponseCode};

/// 返回 `Ok(Some(msg))` 表示该命令失败但不影响批次
fn rewrite_job(
    store: &mut dyn MutableStoreProvider,
    command: JobConfigRewrite,
) -> SchedulerResult<Option<String>> {
    let JobConfigRewrite {
        old_job,
        rewritten_job,
    } = command;
    let rewritten = validate_and_populate_job(rewritten_job)
        .map_err(|e| SchedulerError::internal(format!("Invalid job configuration: {e}")))?;

    if old_job.key != rewritten.key {
        return Ok(Some("Disallowing rewrite attempting to change job key.".to_string()));
    }
    if old_job.owner != rewritten.owner {
        return Ok(Some("Disallowing rewrite attempting to change job owner.".to_string()));
    }

    let key = &old_job.key;
    let job_store = store.job_store();
    let mut matches: Vec<_> = job_store
        .fetch_manager_ids()
        .into_iter()
        .filter_map(|manager_id| {
            job_store
                .fetch_job(&manager_id, key)
                .map(|stored| (manager_id, stored))
        })
        .collect();

    let (manager_id, stored) = match matches.len() {
        0 => return Ok(Some(format!("No jobs found for key {key}"))),
        1 => matches.remove(0),
        _ => return Ok(Some(format!("Multiple jobs found for key {key}"))),
    };
    if stored != old_job {
        return Ok(Some(format!("CAS compare failed for {key}")));
    }

    store.job_store_mut().save_accepted_job(&manager_id, rewritten);
    info!("作业 {} 的配置已被重写", key);
    Ok(None)
}

fn rewrite_instance(
    store: &mut dyn MutableStoreProvider,
    command: InstanceConfigRewrite,
) -> SchedulerResult<Option<String>> {
    let InstanceConfigRewrite {
        instance_key,
        old_task,
        rewritten_task,
    } = command;
    let rewritten = validate_and_populate_task(rewritten_task)
        .map_err(|e| SchedulerError::internal(format!("Invalid task configuration: {e}")))?;

    let query =
        TaskQuery::instance_scoped(&instance_key.job_key, [instance_key.instance_id]).active();
    let mut tasks = store.task_store().fetch_tasks(&query);
    let task = match tasks.len() {
        0 => return Ok(Some(format!("No active task found for {instance_key}"))),
        1 => tasks.remove(0),
        _ => return Ok(Some(format!("Multiple active tasks found for {instance_key}"))),
    };
    if task.assigned_task.task != old_task {
        return Ok(Some(format!("CAS compare failed for {instance_key}")));
    }

    let task_id = task.task_id();
    if !store.task_store_mut().unsafe_modify_in_place(task_id, rewritten) {
        return Ok(Some(format!("Did not change {task_id}")));
    }
    info!("实例 {} 的任务配置已被重写", instance_key);
    Ok(None)
}

impl SchedulerApi {
    pub async fn rewrite_configs(
        &self,
        commands: Vec<RewriteCommand>,
        session: &SessionKey,
    ) -> Response {
        let result = self.try_rewrite_configs(commands, session).await;
        self.respond(Operation::RewriteConfigs, result).await
    }

    async fn try_rewrite_configs(
        &self,
        commands: Vec<RewriteCommand>,
        session: &SessionKey,
    ) -> ApiResult<Response> {
        self.authorize(Operation::RewriteConfigs, session, &BTreeSet::new())?;
        if commands.is_empty() {
            return Ok(Response::error(
                ResponseCode::Error,
                "No rewrite commands provided.",
            ));
        }

        let errors = storage::write(
            self.state.storage.as_ref(),
            |store: &mut dyn MutableStoreProvider| {
                let mut errors = Vec::new();
                for command in commands {
                    let outcome = match command {
                        RewriteCommand::JobRewrite(rewrite) => rewrite_job(store, rewrite)?,
                        RewriteCommand::InstanceRewrite(rewrite) => {
                            rewrite_instance(store, rewrite)?
                        }
                    };
                    errors.extend(outcome);
                }
                Ok(errors)
            },
        )
        .await?;

        if errors.is_empty() {
            return Ok(Response::ok_with_message("All rewrites completed successfully."));
        }

        for error in &errors {
            warn!("重写命令失败: {}", error);
            self.track(EventKind::RewriteFailed, Operation::RewriteConfigs, error.clone())
                .await;
        }
        Ok(Response::error(ResponseCode::Warning, errors.join(", ")))
    }
}
