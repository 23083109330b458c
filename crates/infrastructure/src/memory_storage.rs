use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use scheduler_core::config::StorageConfig;
use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::storage::{
    JobStore, LockStore, MutableJobStore, MutableLockStore, MutableQuotaStore,
    MutableStoreProvider, MutableTaskStore, MutateWork, QuotaStore, ReadWork, Storage,
    StoreProvider, TaskStore,
};
use scheduler_domain::{
    JobConfiguration, JobKey, Lock, LockKey, ResourceAggregate, ScheduledTask, TaskConfig,
    TaskQuery,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

/// 存储中全部可持久化的状态
///
/// 作业和锁以规范字符串为键，保证可以直接序列化为JSON。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    tasks: BTreeMap<String, ScheduledTask>,
    jobs: BTreeMap<String, BTreeMap<String, JobConfiguration>>,
    locks: BTreeMap<String, Lock>,
    quotas: BTreeMap<String, ResourceAggregate>,
}

impl StoreState {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

impl TaskStore for StoreState {
    fn fetch_tasks(&self, query: &TaskQuery) -> Vec<ScheduledTask> {
        if !query.task_ids.is_empty() {
            return query
                .task_ids
                .iter()
                .filter_map(|id| self.tasks.get(id))
                .filter(|task| query.matches(task))
                .cloned()
                .collect();
        }
        self.tasks
            .values()
            .filter(|task| query.matches(task))
            .cloned()
            .collect()
    }
}

impl MutableTaskStore for StoreState {
    fn save_tasks(&mut self, tasks: Vec<ScheduledTask>) {
        for task in tasks {
            self.tasks.insert(task.task_id().to_string(), task);
        }
    }

    fn delete_tasks(&mut self, task_ids: &BTreeSet<String>) {
        for id in task_ids {
            self.tasks.remove(id);
        }
    }

    fn delete_all_tasks(&mut self) {
        self.tasks.clear();
    }

    fn mutate_tasks(
        &mut self,
        query: &TaskQuery,
        mutator: &mut dyn FnMut(&ScheduledTask) -> Option<ScheduledTask>,
    ) -> Vec<ScheduledTask> {
        let mut mutated = Vec::new();
        for task in self.tasks.values_mut() {
            if !query.matches(task) {
                continue;
            }
            if let Some(updated) = mutator(task) {
                *task = updated.clone();
                mutated.push(updated);
            }
        }
        mutated
    }

    fn unsafe_modify_in_place(&mut self, task_id: &str, config: TaskConfig) -> bool {
        match self.tasks.get_mut(task_id) {
            Some(task) => {
                task.assigned_task.task = config;
                true
            }
            None => false,
        }
    }
}

impl JobStore for StoreState {
    fn fetch_manager_ids(&self) -> Vec<String> {
        self.jobs.keys().cloned().collect()
    }

    fn fetch_jobs(&self, manager_id: &str) -> Vec<JobConfiguration> {
        self.jobs
            .get(manager_id)
            .map(|jobs| jobs.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl MutableJobStore for StoreState {
    fn save_accepted_job(&mut self, manager_id: &str, job: JobConfiguration) {
        self.jobs
            .entry(manager_id.to_string())
            .or_default()
            .insert(job.key.canonical(), job);
    }

    fn remove_job(&mut self, key: &JobKey) {
        let canonical = key.canonical();
        for jobs in self.jobs.values_mut() {
            jobs.remove(&canonical);
        }
        self.jobs.retain(|_, jobs| !jobs.is_empty());
    }
}

impl LockStore for StoreState {
    fn fetch_locks(&self) -> Vec<Lock> {
        self.locks.values().cloned().collect()
    }

    fn fetch_lock(&self, key: &LockKey) -> Option<Lock> {
        self.locks.get(&key.to_string()).cloned()
    }
}

impl MutableLockStore for StoreState {
    fn save_lock(&mut self, lock: Lock) {
        self.locks.insert(lock.key.to_string(), lock);
    }

    fn remove_lock(&mut self, key: &LockKey) {
        self.locks.remove(&key.to_string());
    }
}

impl QuotaStore for StoreState {
    fn fetch_quota(&self, role: &str) -> Option<ResourceAggregate> {
        self.quotas.get(role).copied()
    }

    fn fetch_quotas(&self) -> BTreeMap<String, ResourceAggregate> {
        self.quotas.clone()
    }
}

impl MutableQuotaStore for StoreState {
    fn save_quota(&mut self, role: &str, quota: ResourceAggregate) {
        self.quotas.insert(role.to_string(), quota);
    }

    fn remove_quota(&mut self, role: &str) {
        self.quotas.remove(role);
    }
}

impl StoreProvider for StoreState {
    fn task_store(&self) -> &dyn TaskStore {
        self
    }

    fn job_store(&self) -> &dyn JobStore {
        self
    }

    fn lock_store(&self) -> &dyn LockStore {
        self
    }

    fn quota_store(&self) -> &dyn QuotaStore {
        self
    }
}

impl MutableStoreProvider for StoreState {
    fn task_store_mut(&mut self) -> &mut dyn MutableTaskStore {
        self
    }

    fn job_store_mut(&mut self) -> &mut dyn MutableJobStore {
        self
    }

    fn lock_store_mut(&mut self) -> &mut dyn MutableLockStore {
        self
    }

    fn quota_store_mut(&mut self) -> &mut dyn MutableQuotaStore {
        self
    }

    fn as_read_only(&self) -> &dyn StoreProvider {
        self
    }
}

/// 内存存储实现
///
/// 写事务在状态副本上执行，成功后整体提交，失败时丢弃副本。
/// 一致读与写事务共用同一把读写锁；弱一致读读取最近一次提交后发布的快照，
/// 不会等待进行中的写事务。
pub struct MemStorage {
    state: RwLock<StoreState>,
    committed: watch::Sender<Arc<StoreState>>,
    snapshot_path: Option<PathBuf>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::from_state(StoreState::default(), None)
    }

    pub fn with_config(config: &StorageConfig) -> Self {
        Self::from_state(
            StoreState::default(),
            config.snapshot_path.as_ref().map(PathBuf::from),
        )
    }

    fn from_state(state: StoreState, snapshot_path: Option<PathBuf>) -> Self {
        let (committed, _) = watch::channel(Arc::new(state.clone()));
        Self {
            state: RwLock::new(state),
            committed,
            snapshot_path,
        }
    }

    /// 从快照文件恢复存储
    pub async fn load_snapshot(config: &StorageConfig) -> SchedulerResult<Self> {
        let Some(path) = config.snapshot_path.as_ref().map(PathBuf::from) else {
            return Ok(Self::new());
        };
        if !tokio::fs::try_exists(&path).await? {
            info!("快照文件不存在，使用空存储: {}", path.display());
            return Ok(Self::from_state(StoreState::default(), Some(path)));
        }

        let bytes = tokio::fs::read(&path).await?;
        let state: StoreState = serde_json::from_slice(&bytes).map_err(|e| {
            SchedulerError::storage(format!("Failed to parse snapshot {}: {e}", path.display()))
        })?;
        info!(
            "已从快照恢复存储: {} ({} 个任务)",
            path.display(),
            state.task_count()
        );
        Ok(Self::from_state(state, Some(path)))
    }

    /// 最近一次提交的状态
    pub fn export_state(&self) -> StoreState {
        self.committed.borrow().as_ref().clone()
    }

    /// 整体替换存储状态
    pub async fn restore_state(&self, state: StoreState) {
        let mut guard = self.state.write().await;
        *guard = state;
        self.committed.send_replace(Arc::new(guard.clone()));
        info!("存储状态已被替换 ({} 个任务)", guard.task_count());
    }
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemStorage {
    async fn read_consistent(&self, query: &TaskQuery) -> SchedulerResult<Vec<ScheduledTask>> {
        let guard = self.state.read().await;
        Ok(guard.fetch_tasks(query))
    }

    async fn read_weak(&self, query: &TaskQuery) -> SchedulerResult<Vec<ScheduledTask>> {
        let snapshot = self.committed.borrow().clone();
        Ok(snapshot.fetch_tasks(query))
    }

    async fn consistent_read<'a>(&self, work: ReadWork<'a>) -> SchedulerResult<()> {
        let guard = self.state.read().await;
        work(&*guard)
    }

    async fn weakly_consistent_read<'a>(&self, work: ReadWork<'a>) -> SchedulerResult<()> {
        let snapshot = self.committed.borrow().clone();
        work(snapshot.as_ref())
    }

    async fn write_work<'a>(&self, work: MutateWork<'a>) -> SchedulerResult<()> {
        let mut guard = self.state.write().await;
        let mut working = guard.clone();
        if let Err(e) = work(&mut working) {
            debug!("写事务回滚: {}", e);
            return Err(e);
        }
        *guard = working;
        self.committed.send_replace(Arc::new(guard.clone()));
        Ok(())
    }

    async fn snapshot(&self) -> SchedulerResult<()> {
        let Some(path) = &self.snapshot_path else {
            warn!("未配置快照路径，跳过快照");
            return Ok(());
        };

        let state = self.export_state();
        let bytes = serde_json::to_vec_pretty(&state)?;
        tokio::fs::write(path, bytes).await.map_err(|e| {
            SchedulerError::storage(format!("Failed to write snapshot {}: {e}", path.display()))
        })?;
        info!("快照已写入: {}", path.display());
        Ok(())
    }
}
