//! 存储访问端口
//!
//! 读写都以事务闭包的形式提交给 [`Storage`]：写事务中的任何错误都会使整个事务回滚，
//! 一致读会等待进行中的写事务，弱一致读读取最近一次提交的快照，从不阻塞在写者上。

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use scheduler_core::{SchedulerError, SchedulerResult};

use crate::entities::{JobConfiguration, JobKey, Lock, LockKey, ScheduledTask, TaskConfig};
use crate::query::TaskQuery;
use crate::value_objects::ResourceAggregate;

pub trait TaskStore: Send + Sync {
    fn fetch_tasks(&self, query: &TaskQuery) -> Vec<ScheduledTask>;

    fn fetch_task(&self, task_id: &str) -> Option<ScheduledTask> {
        self.fetch_tasks(&TaskQuery::task_scoped([task_id]))
            .into_iter()
            .next()
    }
}

pub trait MutableTaskStore: TaskStore {
    /// 保存任务，已存在的同ID任务被覆盖
    fn save_tasks(&mut self, tasks: Vec<ScheduledTask>);

    fn delete_tasks(&mut self, task_ids: &BTreeSet<String>);

    fn delete_all_tasks(&mut self);

    /// 对匹配查询的每个任务调用 `mutator`，返回实际被修改的任务
    fn mutate_tasks(
        &mut self,
        query: &TaskQuery,
        mutator: &mut dyn FnMut(&ScheduledTask) -> Option<ScheduledTask>,
    ) -> Vec<ScheduledTask>;

    /// 原地替换任务配置，不改变任务ID和状态。任务不存在时返回false
    fn unsafe_modify_in_place(&mut self, task_id: &str, config: TaskConfig) -> bool;
}

pub trait JobStore: Send + Sync {
    fn fetch_manager_ids(&self) -> Vec<String>;

    fn fetch_jobs(&self, manager_id: &str) -> Vec<JobConfiguration>;

    fn fetch_job(&self, manager_id: &str, key: &JobKey) -> Option<JobConfiguration> {
        self.fetch_jobs(manager_id)
            .into_iter()
            .find(|job| &job.key == key)
    }
}

pub trait MutableJobStore: JobStore {
    fn save_accepted_job(&mut self, manager_id: &str, job: JobConfiguration);

    fn remove_job(&mut self, key: &JobKey);
}

pub trait LockStore: Send + Sync {
    fn fetch_locks(&self) -> Vec<Lock>;

    fn fetch_lock(&self, key: &LockKey) -> Option<Lock>;
}

pub trait MutableLockStore: LockStore {
    fn save_lock(&mut self, lock: Lock);

    fn remove_lock(&mut self, key: &LockKey);
}

pub trait QuotaStore: Send + Sync {
    fn fetch_quota(&self, role: &str) -> Option<ResourceAggregate>;

    fn fetch_quotas(&self) -> BTreeMap<String, ResourceAggregate>;
}

pub trait MutableQuotaStore: QuotaStore {
    fn save_quota(&mut self, role: &str, quota: ResourceAggregate);

    fn remove_quota(&mut self, role: &str);
}

/// 只读事务中可见的存储视图
pub trait StoreProvider: Send + Sync {
    fn task_store(&self) -> &dyn TaskStore;
    fn job_store(&self) -> &dyn JobStore;
    fn lock_store(&self) -> &dyn LockStore;
    fn quota_store(&self) -> &dyn QuotaStore;
}

/// 写事务中可见的存储视图
pub trait MutableStoreProvider: StoreProvider {
    fn task_store_mut(&mut self) -> &mut dyn MutableTaskStore;
    fn job_store_mut(&mut self) -> &mut dyn MutableJobStore;
    fn lock_store_mut(&mut self) -> &mut dyn MutableLockStore;
    fn quota_store_mut(&mut self) -> &mut dyn MutableQuotaStore;

    fn as_read_only(&self) -> &dyn StoreProvider;
}

pub type ReadWork<'a> = Box<dyn FnOnce(&dyn StoreProvider) -> SchedulerResult<()> + Send + 'a>;

pub type MutateWork<'a> =
    Box<dyn FnOnce(&mut dyn MutableStoreProvider) -> SchedulerResult<()> + Send + 'a>;

/// 存储访问层
#[async_trait]
pub trait Storage: Send + Sync {
    /// 线性一致读，结果可用于驱动后续的变更决策
    async fn read_consistent(&self, query: &TaskQuery) -> SchedulerResult<Vec<ScheduledTask>>;

    /// 弱一致读，只用于信息查询
    async fn read_weak(&self, query: &TaskQuery) -> SchedulerResult<Vec<ScheduledTask>>;

    async fn consistent_read<'a>(&self, work: ReadWork<'a>) -> SchedulerResult<()>;

    async fn weakly_consistent_read<'a>(&self, work: ReadWork<'a>) -> SchedulerResult<()>;

    /// 以独占方式执行写事务；`work` 返回错误时不产生任何可见修改
    async fn write_work<'a>(&self, work: MutateWork<'a>) -> SchedulerResult<()>;

    async fn snapshot(&self) -> SchedulerResult<()>;
}

/// 执行一个带返回值的写事务
pub async fn write<S, R, F>(storage: &S, work: F) -> SchedulerResult<R>
where
    S: Storage + ?Sized,
    R: Send,
    F: FnOnce(&mut dyn MutableStoreProvider) -> SchedulerResult<R> + Send,
{
    let mut output = None;
    storage
        .write_work(Box::new(|provider: &mut dyn MutableStoreProvider| {
            output = Some(work(provider)?);
            Ok(())
        }))
        .await?;
    output.ok_or_else(|| SchedulerError::internal("写事务未返回结果"))
}

/// 执行一个带返回值的一致读
pub async fn consistent_read<S, R, F>(storage: &S, work: F) -> SchedulerResult<R>
where
    S: Storage + ?Sized,
    R: Send,
    F: FnOnce(&dyn StoreProvider) -> SchedulerResult<R> + Send,
{
    let mut output = None;
    storage
        .consistent_read(Box::new(|provider: &dyn StoreProvider| {
            output = Some(work(provider)?);
            Ok(())
        }))
        .await?;
    output.ok_or_else(|| SchedulerError::internal("读事务未返回结果"))
}

/// 执行一个带返回值的弱一致读
pub async fn weakly_consistent_read<S, R, F>(storage: &S, work: F) -> SchedulerResult<R>
where
    S: Storage + ?Sized,
    R: Send,
    F: FnOnce(&dyn StoreProvider) -> SchedulerResult<R> + Send,
{
    let mut output = None;
    storage
        .weakly_consistent_read(Box::new(|provider: &dyn StoreProvider| {
            output = Some(work(provider)?);
            Ok(())
        }))
        .await?;
    output.ok_or_else(|| SchedulerError::internal("读事务未返回结果"))
}
