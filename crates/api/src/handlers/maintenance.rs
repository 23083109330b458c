use std::collections::BTreeSet;

use scheduler_core::SchedulerResult;
use scheduler_domain::HostStatuses;

use crate::auth::SessionKey;
use crate::coordinator::SchedulerApi;
use crate::error::ApiResult;
use crate::policy::Operation;
use crate::response::{Response, ResponseResult};

impl SchedulerApi {
    pub async fn start_maintenance(&self, hosts: BTreeSet<String>, session: &SessionKey) -> Response {
        let result = self
            .host_operation(Operation::StartMaintenance, session, async {
                self.state.maintenance.start_maintenance(&hosts).await
            })
            .await;
        self.respond(Operation::StartMaintenance, result).await
    }

    pub async fn drain_hosts(&self, hosts: BTreeSet<String>, session: &SessionKey) -> Response {
        let result = self
            .host_operation(Operation::DrainHosts, session, async {
                self.state.maintenance.drain(&hosts).await
            })
            .await;
        self.respond(Operation::DrainHosts, result).await
    }

    pub async fn maintenance_status(&self, hosts: BTreeSet<String>, session: &SessionKey) -> Response {
        let result = self
            .host_operation(Operation::MaintenanceStatus, session, async {
                self.state.maintenance.get_status(&hosts).await
            })
            .await;
        self.respond(Operation::MaintenanceStatus, result).await
    }

    pub async fn end_maintenance(&self, hosts: BTreeSet<String>, session: &SessionKey) -> Response {
        let result = self
            .host_operation(Operation::EndMaintenance, session, async {
                self.state.maintenance.end_maintenance(&hosts).await
            })
            .await;
        self.respond(Operation::EndMaintenance, result).await
    }

    /// 授权通过后才执行维护操作
    async fn host_operation(
        &self,
        operation: Operation,
        session: &SessionKey,
        work: impl std::future::Future<Output = SchedulerResult<HostStatuses>>,
    ) -> ApiResult<Response> {
        self.authorize(operation, session, &BTreeSet::new())?;
        let statuses = work.await?;
        Ok(Response::ok_with_result(ResponseResult::HostStatuses(statuses)))
    }
}
