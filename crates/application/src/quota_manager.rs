use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::storage::{self, Storage, StoreProvider};
use scheduler_domain::{JobKey, QuotaInfo, ResourceAggregate, TaskConfig, TaskQuery};
use tracing::{debug, info};

#[async_trait]
pub trait QuotaManager: Send + Sync {
    async fn get_quota_info(&self, role: &str) -> SchedulerResult<QuotaInfo>;

    /// 替换角色的配额，任一分量为负时拒绝
    async fn save_quota(&self, role: &str, quota: ResourceAggregate) -> SchedulerResult<()>;
}

/// 根据当前任务和cron模板计算角色的配额使用情况
///
/// 活跃任务按各自配置计入；cron模板只在其作业当前没有活跃任务时按实例数计入，
/// 避免同一作业被计算两次。
pub fn compute_quota_info(store: &dyn StoreProvider, role: &str) -> QuotaInfo {
    let active_tasks = store
        .task_store()
        .fetch_tasks(&TaskQuery::role_scoped(role).active());

    let active_jobs: BTreeSet<JobKey> = active_tasks.iter().map(|task| task.job_key()).collect();
    let mut consumers: Vec<(TaskConfig, i32)> = active_tasks
        .into_iter()
        .map(|task| (task.assigned_task.task, 1))
        .collect();

    let job_store = store.job_store();
    for manager_id in job_store.fetch_manager_ids() {
        consumers.extend(
            job_store
                .fetch_jobs(&manager_id)
                .into_iter()
                .filter(|job| job.key.role == role && !active_jobs.contains(&job.key))
                .map(|job| (job.task_config, job.instance_count)),
        );
    }

    let mut info = QuotaInfo {
        quota: store
            .quota_store()
            .fetch_quota(role)
            .unwrap_or(ResourceAggregate::EMPTY),
        ..QuotaInfo::default()
    };
    for (config, count) in consumers {
        let consumed = config.resources().scale(count);
        if config.is_production() {
            info.prod_consumption += consumed;
        } else {
            info.non_prod_consumption += consumed;
        }
    }
    info
}

/// 准入检查：新增的生产资源加上当前生产消耗不能超过配额
///
/// 在写事务内调用，消耗基于决策时刻的任务状态重新计算。
pub fn check_production_admission(
    store: &dyn StoreProvider,
    role: &str,
    additional: ResourceAggregate,
) -> SchedulerResult<()> {
    if additional == ResourceAggregate::EMPTY {
        return Ok(());
    }

    let info = compute_quota_info(store, role);
    let projected = info
        .prod_consumption
        .checked_add(&additional)
        .ok_or_else(|| resource_overflow(role))?;
    if projected.exceeds(&info.quota) {
        return Err(SchedulerError::quota(format!(
            "Insufficient resource quota for role {role}: requested {additional}, consumed {}, allotment {}",
            info.prod_consumption, info.quota
        )));
    }
    debug!("角色 {} 配额检查通过, 预计生产消耗 {}", role, projected);
    Ok(())
}

fn resource_overflow(role: &str) -> SchedulerError {
    SchedulerError::quota(format!(
        "Resource demand for role {role} exceeds the representable range"
    ))
}

/// 生产任务的资源总需求，非生产任务不受配额限制
///
/// 累加溢出时按配额错误拒绝。
pub fn production_demand<'a>(
    role: &str,
    configs: impl IntoIterator<Item = &'a TaskConfig>,
) -> SchedulerResult<ResourceAggregate> {
    configs
        .into_iter()
        .filter(|config| config.is_production())
        .try_fold(ResourceAggregate::EMPTY, |total, config| {
            total
                .checked_add(&config.resources())
                .ok_or_else(|| resource_overflow(role))
        })
}

pub struct StorageQuotaManager {
    storage: Arc<dyn Storage>,
}

impl StorageQuotaManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl QuotaManager for StorageQuotaManager {
    async fn get_quota_info(&self, role: &str) -> SchedulerResult<QuotaInfo> {
        storage::consistent_read(self.storage.as_ref(), |store| {
            Ok(compute_quota_info(store, role))
        })
        .await
    }

    async fn save_quota(&self, role: &str, quota: ResourceAggregate) -> SchedulerResult<()> {
        if role.trim().is_empty() {
            return Err(SchedulerError::quota("Role must be set"));
        }
        if quota.has_negative() {
            return Err(SchedulerError::quota(format!("Negative values in: {quota}")));
        }

        storage::write(self.storage.as_ref(), |store| {
            store.quota_store_mut().save_quota(role, quota);
            Ok(())
        })
        .await?;
        info!("角色 {} 的配额已更新为 {}", role, quota);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_domain::{
        ExecutorConfig, Identity, JobConfiguration, MutableStoreProvider, ScheduleStatus,
        ScheduledTask,
    };
    use scheduler_infrastructure::MemStorage;

    fn config(role: &str, job: &str, production: bool) -> TaskConfig {
        TaskConfig {
            owner: Identity::new(role, "user"),
            environment: "prod".to_string(),
            job_name: job.to_string(),
            is_service: Some(true),
            num_cpus: 1.0,
            ram_mb: 100,
            disk_mb: 200,
            priority: Some(0),
            max_task_failures: Some(1),
            production: Some(production),
            contact_email: None,
            requested_ports: Default::default(),
            executor_config: Some(ExecutorConfig {
                name: "thermos".to_string(),
                data: String::new(),
            }),
        }
    }

    async fn seed(storage: &MemStorage, tasks: Vec<ScheduledTask>, cron: Vec<JobConfiguration>) {
        storage::write(storage, |store: &mut dyn MutableStoreProvider| {
            store.task_store_mut().save_tasks(tasks);
            for job in cron {
                store.job_store_mut().save_accepted_job("CRON", job);
            }
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_quota_info_partitions_consumption() {
        let storage = Arc::new(MemStorage::new());
        let mut finished = ScheduledTask::pending(config("r1", "done", true), 0, 1);
        finished.status = ScheduleStatus::Finished;
        seed(
            &storage,
            vec![
                ScheduledTask::pending(config("r1", "a", true), 0, 1),
                ScheduledTask::pending(config("r1", "a", true), 1, 1),
                ScheduledTask::pending(config("r1", "b", false), 0, 1),
                ScheduledTask::pending(config("r2", "c", true), 0, 1),
                finished,
            ],
            vec![],
        )
        .await;

        let manager = StorageQuotaManager::new(storage);
        let info = manager.get_quota_info("r1").await.unwrap();
        assert_eq!(info.quota, ResourceAggregate::EMPTY);
        assert_eq!(info.prod_consumption, ResourceAggregate::new(2.0, 200, 400));
        assert_eq!(info.non_prod_consumption, ResourceAggregate::new(1.0, 100, 200));

        let again = manager.get_quota_info("r1").await.unwrap();
        assert_eq!(info, again);
    }

    #[tokio::test]
    async fn test_cron_templates_count_only_without_active_tasks() {
        let storage = Arc::new(MemStorage::new());
        let template = |name: &str| JobConfiguration {
            key: JobKey::new("r1", "prod", name),
            owner: Identity::new("r1", "user"),
            cron_schedule: Some("* * * * *".to_string()),
            task_config: config("r1", name, true),
            instance_count: 3,
        };
        seed(
            &storage,
            vec![ScheduledTask::pending(config("r1", "running", true), 0, 1)],
            vec![template("idle"), template("running")],
        )
        .await;

        let info = StorageQuotaManager::new(storage)
            .get_quota_info("r1")
            .await
            .unwrap();
        // idle模板3个实例 + running作业的1个活跃任务
        assert_eq!(info.prod_consumption, ResourceAggregate::new(4.0, 400, 800));
    }

    #[tokio::test]
    async fn test_save_quota_rejects_negative_values() {
        let storage = Arc::new(MemStorage::new());
        let manager = StorageQuotaManager::new(storage);

        let err = manager
            .save_quota("r1", ResourceAggregate::new(-1.0, 0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Quota(_)));
        assert!(err.to_string().starts_with("Negative values in"));
        assert_eq!(
            manager.get_quota_info("r1").await.unwrap().quota,
            ResourceAggregate::EMPTY
        );

        let quota = ResourceAggregate::new(10.0, 1024, 2048);
        manager.save_quota("r1", quota).await.unwrap();
        assert_eq!(manager.get_quota_info("r1").await.unwrap().quota, quota);
    }

    #[tokio::test]
    async fn test_admission_check() {
        let storage = Arc::new(MemStorage::new());
        seed(
            &storage,
            vec![ScheduledTask::pending(config("r1", "a", true), 0, 1)],
            vec![],
        )
        .await;
        StorageQuotaManager::new(storage.clone())
            .save_quota("r1", ResourceAggregate::new(2.0, 200, 400))
            .await
            .unwrap();

        let one = config("r1", "b", true).resources();
        storage::consistent_read(storage.as_ref(), |store| {
            check_production_admission(store, "r1", one)?;
            let err = check_production_admission(store, "r1", one.scale(2)).unwrap_err();
            assert!(err.to_string().starts_with("Insufficient resource quota"));
            // 没有配额的角色也不限制非生产需求
            check_production_admission(store, "r3", ResourceAggregate::EMPTY)
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_production_demand_ignores_non_production() {
        let configs = [config("r", "a", true), config("r", "a", false), config("r", "a", true)];
        assert_eq!(
            production_demand("r", configs.iter()).unwrap(),
            ResourceAggregate::new(2.0, 200, 400)
        );
    }

    #[test]
    fn test_production_demand_overflow_is_a_quota_error() {
        let mut big = config("r", "a", true);
        big.ram_mb = i64::MAX;
        let err = production_demand("r", [big.clone(), big].iter()).unwrap_err();
        assert!(matches!(err, SchedulerError::Quota(_)));
    }
}
