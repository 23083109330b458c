use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::{SchedulerError, SchedulerResult};
use scheduler_domain::storage::{self, Storage, StoreProvider};
use scheduler_domain::{Lock, LockKey};
use tracing::{debug, info};
use uuid::Uuid;

/// 作业变更锁管理
///
/// 锁由调用方显式持有，可跨越多次请求（获取 → 读取 → 计算 → 写入 → 释放），
/// 不会自动过期。
#[async_trait]
pub trait LockManager: Send + Sync {
    /// 获取锁。已有存活锁时立即失败，不排队
    async fn acquire_lock(&self, key: LockKey, user: &str) -> SchedulerResult<Lock>;

    /// 资源未加锁时总是成功；已加锁时要求调用方出示令牌相同的锁
    async fn validate_if_locked(&self, key: &LockKey, held: Option<&Lock>) -> SchedulerResult<()>;

    /// 删除键和令牌都匹配的锁，锁不存在时不报错
    async fn release_lock(&self, lock: &Lock) -> SchedulerResult<()>;

    /// 管理员覆盖：删除键上的任意锁
    async fn release_lock_unchecked(&self, key: &LockKey) -> SchedulerResult<()>;

    async fn get_locks(&self) -> SchedulerResult<Vec<Lock>>;
}

/// 在已打开的事务中校验锁
pub fn validate_lock(
    store: &dyn StoreProvider,
    key: &LockKey,
    held: Option<&Lock>,
) -> SchedulerResult<()> {
    let Some(stored) = store.lock_store().fetch_lock(key) else {
        return Ok(());
    };

    match held {
        None => Err(SchedulerError::lock(format!(
            "Unable to perform operation for: {key}. Use override/cancel option."
        ))),
        Some(held) if held.key != stored.key || held.token != stored.token => Err(
            SchedulerError::lock(format!("Invalid operation context: {held}")),
        ),
        Some(_) => Ok(()),
    }
}

fn format_timestamp(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map(|time| time.to_rfc3339())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

/// 基于存储的锁管理器，所有锁操作都经过存储的事务写入口
pub struct StorageLockManager {
    storage: Arc<dyn Storage>,
}

impl StorageLockManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl LockManager for StorageLockManager {
    async fn acquire_lock(&self, key: LockKey, user: &str) -> SchedulerResult<Lock> {
        let user = user.to_string();
        let lock = storage::write(self.storage.as_ref(), move |store| {
            if let Some(existing) = store.lock_store().fetch_lock(&key) {
                return Err(SchedulerError::lock(format!(
                    "Operation for: {} is already in progress. Started at: {}. Current owner: {}.",
                    key,
                    format_timestamp(existing.timestamp_ms),
                    existing.user
                )));
            }

            let lock = Lock {
                key,
                token: Uuid::new_v4().to_string(),
                user,
                timestamp_ms: Utc::now().timestamp_millis(),
                message: None,
            };
            store.lock_store_mut().save_lock(lock.clone());
            Ok(lock)
        })
        .await?;

        info!("锁已获取: {} (用户: {})", lock.key, lock.user);
        Ok(lock)
    }

    async fn validate_if_locked(&self, key: &LockKey, held: Option<&Lock>) -> SchedulerResult<()> {
        storage::consistent_read(self.storage.as_ref(), |store| validate_lock(store, key, held))
            .await
    }

    async fn release_lock(&self, lock: &Lock) -> SchedulerResult<()> {
        let released = storage::write(self.storage.as_ref(), |store| {
            let matches = store
                .lock_store()
                .fetch_lock(&lock.key)
                .is_some_and(|stored| stored.token == lock.token);
            if matches {
                store.lock_store_mut().remove_lock(&lock.key);
            }
            Ok(matches)
        })
        .await?;

        if released {
            info!("锁已释放: {}", lock.key);
        } else {
            debug!("释放的锁不存在或已被替换: {}", lock);
        }
        Ok(())
    }

    async fn release_lock_unchecked(&self, key: &LockKey) -> SchedulerResult<()> {
        storage::write(self.storage.as_ref(), |store| {
            store.lock_store_mut().remove_lock(key);
            Ok(())
        })
        .await?;
        info!("锁已被强制释放: {}", key);
        Ok(())
    }

    async fn get_locks(&self) -> SchedulerResult<Vec<Lock>> {
        storage::weakly_consistent_read(self.storage.as_ref(), |store| {
            Ok(store.lock_store().fetch_locks())
        })
        .await
    }
}
