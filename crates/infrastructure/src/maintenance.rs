use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use scheduler_core::SchedulerResult;
use scheduler_domain::{
    HostStatuses, MaintenanceController, MaintenanceMode, Storage, TaskQuery,
};
use tokio::sync::RwLock;
use tracing::info;

/// 内存中的主机维护状态
///
/// 进入排空的主机上没有活跃任务时直接变为DRAINED。
pub struct InMemoryMaintenanceController {
    storage: Arc<dyn Storage>,
    hosts: RwLock<BTreeMap<String, MaintenanceMode>>,
}

impl InMemoryMaintenanceController {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            hosts: RwLock::new(BTreeMap::new()),
        }
    }

    async fn statuses(&self, hosts: &BTreeSet<String>) -> HostStatuses {
        let modes = self.hosts.read().await;
        hosts
            .iter()
            .map(|host| {
                let mode = modes.get(host).copied().unwrap_or(MaintenanceMode::None);
                (host.clone(), mode)
            })
            .collect()
    }
}

#[async_trait]
impl MaintenanceController for InMemoryMaintenanceController {
    async fn start_maintenance(&self, hosts: &BTreeSet<String>) -> SchedulerResult<HostStatuses> {
        {
            let mut modes = self.hosts.write().await;
            for host in hosts {
                modes.insert(host.clone(), MaintenanceMode::Scheduled);
            }
        }
        info!("主机进入维护计划: {:?}", hosts);
        Ok(self.statuses(hosts).await)
    }

    async fn drain(&self, hosts: &BTreeSet<String>) -> SchedulerResult<HostStatuses> {
        let mut drained = BTreeMap::new();
        for host in hosts {
            let active = self
                .storage
                .read_consistent(&TaskQuery::unscoped().by_slave_host(host).active())
                .await?;
            let mode = if active.is_empty() {
                MaintenanceMode::Drained
            } else {
                MaintenanceMode::Draining
            };
            drained.insert(host.clone(), mode);
        }

        self.hosts.write().await.extend(drained.clone());
        info!("主机排空状态: {:?}", drained);
        Ok(drained)
    }

    async fn get_status(&self, hosts: &BTreeSet<String>) -> SchedulerResult<HostStatuses> {
        Ok(self.statuses(hosts).await)
    }

    async fn end_maintenance(&self, hosts: &BTreeSet<String>) -> SchedulerResult<HostStatuses> {
        {
            let mut modes = self.hosts.write().await;
            for host in hosts {
                modes.remove(host);
            }
        }
        info!("主机结束维护: {:?}", hosts);
        Ok(self.statuses(hosts).await)
    }
}
