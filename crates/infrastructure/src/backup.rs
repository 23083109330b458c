use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::storage::{MutableTaskStore, TaskStore};
use scheduler_domain::{Recovery, ScheduledTask, StorageBackup, TaskQuery};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::memory_storage::{MemStorage, StoreState};

/// 内存备份与恢复
///
/// 备份保存为已提交存储状态的完整副本，超过保留数量时淘汰最旧的备份。
pub struct InMemoryBackup {
    storage: Arc<MemStorage>,
    retention: usize,
    sequence: AtomicU64,
    backups: RwLock<VecDeque<(String, StoreState)>>,
    staged: RwLock<Option<StoreState>>,
}

impl InMemoryBackup {
    pub fn new(storage: Arc<MemStorage>, retention: usize) -> Self {
        Self {
            storage,
            retention: retention.max(1),
            sequence: AtomicU64::new(0),
            backups: RwLock::new(VecDeque::new()),
            staged: RwLock::new(None),
        }
    }

    fn no_staged_backup() -> SchedulerError {
        SchedulerError::recovery("No backup is staged for recovery.")
    }
}

#[async_trait]
impl StorageBackup for InMemoryBackup {
    async fn backup_now(&self) -> SchedulerResult<String> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let id = format!("backup-{}-{}", Utc::now().timestamp_millis(), sequence);
        let state = self.storage.export_state();

        let mut backups = self.backups.write().await;
        backups.push_back((id.clone(), state));
        while backups.len() > self.retention {
            if let Some((evicted, _)) = backups.pop_front() {
                info!("淘汰过期备份: {}", evicted);
            }
        }
        info!("备份完成: {}", id);
        Ok(id)
    }
}

#[async_trait]
impl Recovery for InMemoryBackup {
    async fn list_backups(&self) -> SchedulerResult<Vec<String>> {
        Ok(self
            .backups
            .read()
            .await
            .iter()
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn stage(&self, backup_id: &str) -> SchedulerResult<()> {
        let state = self
            .backups
            .read()
            .await
            .iter()
            .find(|(id, _)| id == backup_id)
            .map(|(_, state)| state.clone())
            .ok_or_else(|| SchedulerError::recovery(format!("Unknown backup: {backup_id}")))?;

        let mut staged = self.staged.write().await;
        if staged.is_some() {
            warn!("替换已暂存的备份");
        }
        *staged = Some(state);
        info!("备份已暂存: {}", backup_id);
        Ok(())
    }

    async fn query(&self, query: &TaskQuery) -> SchedulerResult<Vec<ScheduledTask>> {
        self.staged
            .read()
            .await
            .as_ref()
            .map(|state| state.fetch_tasks(query))
            .ok_or_else(Self::no_staged_backup)
    }

    async fn delete_tasks(&self, query: &TaskQuery) -> SchedulerResult<()> {
        let mut staged = self.staged.write().await;
        let state = staged.as_mut().ok_or_else(Self::no_staged_backup)?;
        let doomed: BTreeSet<String> = state
            .fetch_tasks(query)
            .iter()
            .map(|task| task.task_id().to_string())
            .collect();
        state.delete_tasks(&doomed);
        info!("从暂存备份中删除了 {} 个任务", doomed.len());
        Ok(())
    }

    async fn commit(&self) -> SchedulerResult<()> {
        let state = self
            .staged
            .write()
            .await
            .take()
            .ok_or_else(Self::no_staged_backup)?;
        self.storage.restore_state(state).await;
        info!("暂存备份已提交为线上状态");
        Ok(())
    }

    async fn unload(&self) -> SchedulerResult<()> {
        self.staged.write().await.take();
        info!("暂存备份已卸载");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_domain::storage::{self, MutableStoreProvider, Storage};
    use scheduler_domain::{ExecutorConfig, Identity, JobKey, TaskConfig};

    fn task(job: &str) -> ScheduledTask {
        ScheduledTask::pending(
            TaskConfig {
                owner: Identity::new("www", "alice"),
                environment: "prod".to_string(),
                job_name: job.to_string(),
                is_service: Some(true),
                num_cpus: 1.0,
                ram_mb: 64,
                disk_mb: 64,
                priority: Some(0),
                max_task_failures: Some(1),
                production: Some(false),
                contact_email: None,
                requested_ports: Default::default(),
                executor_config: Some(ExecutorConfig {
                    name: "thermos".to_string(),
                    data: String::new(),
                }),
            },
            0,
            1,
        )
    }

    async fn save(storage: &MemStorage, tasks: Vec<ScheduledTask>) {
        storage::write(storage, |store: &mut dyn MutableStoreProvider| {
            store.task_store_mut().save_tasks(tasks);
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_backup_stage_edit_commit() {
        let storage = Arc::new(MemStorage::new());
        save(&storage, vec![task("web"), task("db")]).await;

        let backup = InMemoryBackup::new(storage.clone(), 5);
        let id = backup.backup_now().await.unwrap();
        assert_eq!(backup.list_backups().await.unwrap(), vec![id.clone()]);

        save(&storage, vec![task("cache")]).await;

        backup.stage(&id).await.unwrap();
        let web = TaskQuery::job_scoped(&JobKey::new("www", "prod", "web"));
        assert_eq!(backup.query(&web).await.unwrap().len(), 1);
        backup.delete_tasks(&web).await.unwrap();
        assert!(backup.query(&web).await.unwrap().is_empty());

        backup.commit().await.unwrap();
        let live = storage.read_consistent(&TaskQuery::unscoped()).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].assigned_task.task.job_name, "db");

        let err = backup.commit().await.unwrap_err();
        assert!(matches!(err, SchedulerError::Recovery(_)));
    }

    #[tokio::test]
    async fn test_unknown_backup_and_unload() {
        let backup = InMemoryBackup::new(Arc::new(MemStorage::new()), 2);
        let err = backup.stage("missing").await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown backup: missing");
        assert!(backup.query(&TaskQuery::unscoped()).await.is_err());

        let id = backup.backup_now().await.unwrap();
        backup.stage(&id).await.unwrap();
        backup.unload().await.unwrap();
        assert!(backup.query(&TaskQuery::unscoped()).await.is_err());
    }

    #[tokio::test]
    async fn test_retention_evicts_oldest() {
        let backup = InMemoryBackup::new(Arc::new(MemStorage::new()), 2);
        let first = backup.backup_now().await.unwrap();
        let second = backup.backup_now().await.unwrap();
        let third = backup.backup_now().await.unwrap();
        assert_eq!(backup.list_backups().await.unwrap(), vec![second, third]);
        assert!(backup.stage(&first).await.is_err());
    }
}
