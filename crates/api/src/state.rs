use std::sync::Arc;

use scheduler_application::{
    LockManager, QuotaManager, StateManager, StorageLockManager, StorageQuotaManager,
};
use scheduler_core::{AppConfig, EventTracker, EventTrackerConfig, SchedulerResult};
use scheduler_domain::{
    CronJobManager, CronPredictor, MaintenanceController, Recovery, Storage, StorageBackup,
};
use scheduler_infrastructure::{
    CronExpressionPredictor, InMemoryBackup, InMemoryMaintenanceController, MemStorage,
    StorageCronJobManager,
};
use tracing::info;

use crate::auth::{CredentialSessionValidator, SessionValidator};

/// 协调器依赖的全部协作者
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub lock_manager: Arc<dyn LockManager>,
    pub quota_manager: Arc<dyn QuotaManager>,
    pub session_validator: Arc<dyn SessionValidator>,
    pub cron_job_manager: Arc<dyn CronJobManager>,
    pub cron_predictor: Arc<dyn CronPredictor>,
    pub maintenance: Arc<dyn MaintenanceController>,
    pub backup: Arc<dyn StorageBackup>,
    pub recovery: Arc<dyn Recovery>,
    pub state_manager: StateManager,
    pub events: EventTracker,
}

impl AppState {
    /// 用内存存储装配完整的协作者集合
    pub fn in_memory(
        storage: Arc<MemStorage>,
        session_validator: Arc<dyn SessionValidator>,
        config: &AppConfig,
    ) -> Self {
        let shared: Arc<dyn Storage> = storage.clone();
        let backup = Arc::new(InMemoryBackup::new(
            storage,
            config.storage.backup_retention,
        ));

        Self {
            lock_manager: Arc::new(StorageLockManager::new(shared.clone())),
            quota_manager: Arc::new(StorageQuotaManager::new(shared.clone())),
            cron_job_manager: Arc::new(StorageCronJobManager::new(shared.clone())),
            cron_predictor: Arc::new(CronExpressionPredictor),
            maintenance: Arc::new(InMemoryMaintenanceController::new(shared.clone())),
            backup: backup.clone(),
            recovery: backup,
            session_validator,
            state_manager: StateManager::with_scheduler_name("scheduler-admin"),
            events: EventTracker::with_config(EventTrackerConfig {
                max_events: config.observability.event_buffer_size,
                metrics_enabled: config.observability.metrics_enabled,
            }),
            storage: shared,
        }
    }

    /// 按配置装配：加载快照（如果配置了路径），会话校验使用配置中的凭证
    pub async fn from_config(config: &AppConfig) -> SchedulerResult<Self> {
        let storage = Arc::new(MemStorage::load_snapshot(&config.storage).await?);
        let validator = Arc::new(CredentialSessionValidator::new(&config.auth));
        info!(
            "调度器状态装配完成, 已注册 {} 个API密钥",
            config.auth.api_keys.len()
        );
        Ok(Self::in_memory(storage, validator, config))
    }
}
