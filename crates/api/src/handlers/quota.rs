use std::collections::BTreeSet;

use scheduler_domain::ResourceAggregate;

use crate::auth::SessionKey;
use crate::coordinator::SchedulerApi;
use crate::error::{ApiError, ApiResult};
use crate::policy::Operation;
use crate::response::{Response, ResponseResult};

impl SchedulerApi {
    pub async fn get_quota(&self, role: String) -> Response {
        let result = self.try_get_quota(&role).await;
        self.respond(Operation::GetQuota, result).await
    }

    async fn try_get_quota(&self, role: &str) -> ApiResult<Response> {
        if role.trim().is_empty() {
            return Err(ApiError::invalid_request("Role must be set"));
        }
        let info = self.state.quota_manager.get_quota_info(role).await?;
        Ok(Response::ok_with_result(ResponseResult::Quota(info)))
    }

    pub async fn set_quota(
        &self,
        role: String,
        quota: ResourceAggregate,
        session: &SessionKey,
    ) -> Response {
        let result = self.try_set_quota(&role, quota, session).await;
        self.respond(Operation::SetQuota, result).await
    }

    async fn try_set_quota(
        &self,
        role: &str,
        quota: ResourceAggregate,
        session: &SessionKey,
    ) -> ApiResult<Response> {
        self.authorize(Operation::SetQuota, session, &BTreeSet::new())?;
        self.state.quota_manager.save_quota(role, quota).await?;
        Ok(Response::ok_with_message("Quota applied."))
    }
}
