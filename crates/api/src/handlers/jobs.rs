use std::collections::{BTreeMap, BTreeSet};

use scheduler_application::{check_production_admission, production_demand, validate_lock};
use scheduler_core::SchedulerError;
use scheduler_domain::storage::{self, MutableStoreProvider, StoreProvider};
use scheduler_domain::{
    validate_and_populate_task, JobConfiguration, JobKey, Lock, LockKey, SanitizedConfiguration,
    TaskConfig, TaskQuery,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::SessionKey;
use crate::coordinator::{assert_valid_key, single_role, SchedulerApi};
use crate::error::{ApiError, ApiResult};
use crate::policy::Operation;
use crate::response::{Response, ResponseResult};

/// 向已有作业追加实例的请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddInstancesConfig {
    pub key: JobKey,
    pub task_config: TaskConfig,
    pub instance_ids: BTreeSet<i32>,
}

/// 作业已有活跃任务或已保存模板时视为已存在
fn ensure_job_absent(store: &dyn StoreProvider, key: &JobKey) -> Result<(), SchedulerError> {
    let has_tasks = !store
        .task_store()
        .fetch_tasks(&TaskQuery::job_scoped(key).active())
        .is_empty();
    let job_store = store.job_store();
    let has_template = job_store
        .fetch_manager_ids()
        .iter()
        .any(|manager_id| job_store.fetch_job(manager_id, key).is_some());

    if has_tasks || has_template {
        Err(SchedulerError::schedule(format!("Job already exists: {key}")))
    } else {
        Ok(())
    }
}

impl SchedulerApi {
    pub async fn create_job(
        &self,
        job: JobConfiguration,
        lock: Option<Lock>,
        session: &SessionKey,
    ) -> Response {
        let result = self.try_create_job(job, lock, session).await;
        self.respond(Operation::CreateJob, result).await
    }

    async fn try_create_job(
        &self,
        job: JobConfiguration,
        lock: Option<Lock>,
        session: &SessionKey,
    ) -> ApiResult<Response> {
        self.authorize(Operation::CreateJob, session, &single_role(&job.owner.role))?;

        let sanitized = SanitizedConfiguration::from_unsanitized(job)?;
        let key = sanitized.job_config.key.clone();
        if sanitized.is_cron_job() {
            return Err(SchedulerError::schedule(format!(
                "Job {key} has a cron schedule, use scheduleCronJob instead"
            ))
            .into());
        }

        let lock_key = LockKey::job(key.clone());
        let state_manager = &self.state.state_manager;
        let inserted = storage::write(
            self.state.storage.as_ref(),
            |store: &mut dyn MutableStoreProvider| {
                validate_lock(store.as_read_only(), &lock_key, lock.as_ref())?;
                ensure_job_absent(store.as_read_only(), &key)?;
                let demand = production_demand(&key.role, sanitized.task_configs.values())?;
                check_production_admission(store.as_read_only(), &key.role, demand)?;
                Ok(state_manager.insert_pending_tasks(store, &sanitized.task_configs))
            },
        )
        .await?;

        info!("作业 {} 已创建, {} 个任务等待调度", key, inserted.len());
        Ok(Response::ok_with_message(format!(
            "{} new tasks pending for job {}",
            inserted.len(),
            key
        ))
        .with_warnings(sanitized.warnings))
    }

    pub async fn add_instances(
        &self,
        config: AddInstancesConfig,
        lock: Option<Lock>,
        session: &SessionKey,
    ) -> Response {
        let result = self.try_add_instances(config, lock, session).await;
        self.respond(Operation::AddInstances, result).await
    }

    async fn try_add_instances(
        &self,
        config: AddInstancesConfig,
        lock: Option<Lock>,
        session: &SessionKey,
    ) -> ApiResult<Response> {
        let AddInstancesConfig {
            key,
            task_config,
            instance_ids,
        } = config;
        self.authorize(Operation::AddInstances, session, &single_role(&key.role))?;
        assert_valid_key(&key)?;
        if instance_ids.is_empty() {
            return Err(ApiError::invalid_request("Instance ids must not be empty"));
        }

        let task = validate_and_populate_task(task_config)?;
        if task.job_key() != key {
            return Err(SchedulerError::task_description(format!(
                "Task config for {} does not match job {key}",
                task.job_key()
            ))
            .into());
        }

        if self.state.cron_job_manager.has_job(&key).await? {
            return Err(ApiError::invalid_request("Cron jobs are not supported here."));
        }

        let lock_key = LockKey::job(key.clone());
        let configs: BTreeMap<i32, TaskConfig> = instance_ids
            .iter()
            .map(|instance_id| (*instance_id, task.clone()))
            .collect();
        let state_manager = &self.state.state_manager;
        let inserted = storage::write(
            self.state.storage.as_ref(),
            |store: &mut dyn MutableStoreProvider| {
                validate_lock(store.as_read_only(), &lock_key, lock.as_ref())?;

                let active: BTreeSet<i32> = store
                    .task_store()
                    .fetch_tasks(&TaskQuery::instance_scoped(&key, instance_ids.iter().copied()).active())
                    .iter()
                    .map(|task| task.instance_id())
                    .collect();
                if !active.is_empty() {
                    return Err(SchedulerError::schedule(format!(
                        "Instances {active:?} of job {key} are already active"
                    )));
                }

                let demand = production_demand(&key.role, configs.values())?;
                check_production_admission(store.as_read_only(), &key.role, demand)?;
                Ok(state_manager.insert_pending_tasks(store, &configs))
            },
        )
        .await?;

        info!("作业 {} 新增 {} 个实例", key, inserted.len());
        Ok(Response::ok_with_message("Successfully added instances."))
    }

    /// 只做清洗，不写入任何状态
    pub async fn populate_job_config(&self, job: JobConfiguration) -> Response {
        let result = SanitizedConfiguration::from_unsanitized(job)
            .map(|sanitized| {
                let mut populated: Vec<TaskConfig> = Vec::new();
                for config in sanitized.task_configs.into_values() {
                    if !populated.contains(&config) {
                        populated.push(config);
                    }
                }
                Response::ok_with_result(ResponseResult::PopulateJob(populated))
                    .with_message("Tasks populated")
                    .with_warnings(sanitized.warnings)
            })
            .map_err(|e| ApiError::from(e).prefixed("Invalid configuration: "));
        self.respond(Operation::PopulateJobConfig, result).await
    }
}
