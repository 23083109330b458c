//! 变更协调器
//!
//! 每个外部操作都按 授权 → 清洗 → 锁校验 → 配额检查 → 单次写入 → 响应 的顺序执行。
//! 锁校验总是在授权之后，未授权的调用方无法探测锁状态。

use std::collections::BTreeSet;

use scheduler_core::{EventKind, EventRecord, EventTracker, SchedulerError, SchedulerResult};
use scheduler_domain::JobKey;
use tracing::{debug, info};

use crate::auth::{Capability, SessionContext, SessionKey};
use crate::error::{ApiError, ApiResult};
use crate::policy::{policy_for, AuthPolicy, Operation};
use crate::response::{Response, ResponseCode};
use crate::state::AppState;

pub struct SchedulerApi {
    pub(crate) state: AppState,
}

impl SchedulerApi {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// 结构化事件上下文
    pub fn events(&self) -> &EventTracker {
        &self.state.events
    }

    /// 按策略表授权
    ///
    /// `target_roles` 只在 JobOwner / TaskOwnersOrRoot 策略下使用。
    pub(crate) fn authorize(
        &self,
        operation: Operation,
        session: &SessionKey,
        target_roles: &BTreeSet<String>,
    ) -> ApiResult<SessionContext> {
        let validator = &self.state.session_validator;
        let policy = policy_for(operation);
        let context = match policy {
            AuthPolicy::Public => validator.check_authenticated(session, &BTreeSet::new())?,
            AuthPolicy::JobOwner => validator.check_authenticated(session, target_roles)?,
            AuthPolicy::TaskOwnersOrRoot => {
                match validator.check_authorized(session, Capability::Root, policy.audit()) {
                    Ok(context) => {
                        info!("授予管理员 {} 执行 {} 的权限", context.identity, operation);
                        context
                    }
                    Err(_) => validator.check_authenticated(session, target_roles)?,
                }
            }
            AuthPolicy::Capability(capability) => {
                validator.check_authorized(session, capability, policy.audit())?
            }
        };
        debug!("{} 已授权: {}", operation, context.identity);
        Ok(context)
    }

    /// 把处理结果转换为响应，并记录对应的结构化事件
    pub(crate) async fn respond(&self, operation: Operation, result: ApiResult<Response>) -> Response {
        match result {
            Ok(response) => {
                if operation.is_mutating() && response.response_code == ResponseCode::Ok {
                    let mut event = EventRecord::new(
                        EventKind::MutationApplied,
                        operation.as_str(),
                        response.message().to_string(),
                    );
                    if !response.warnings.is_empty() {
                        event = event.with_data("warnings", response.warnings.len());
                    }
                    self.state.events.track_event(event).await;
                }
                response
            }
            Err(err) => {
                self.track_failure(operation, &err).await;
                Response::from(err)
            }
        }
    }

    pub(crate) async fn track_failure(&self, operation: Operation, err: &ApiError) {
        let kind = match (err.response_code(), err) {
            (ResponseCode::AuthFailed, _) => EventKind::AuthFailed,
            (ResponseCode::LockError, _) => EventKind::LockConflict,
            (_, ApiError::Scheduler(SchedulerError::Quota(_))) => EventKind::QuotaRejected,
            (ResponseCode::Error, _) => EventKind::BackendFailure,
            _ => EventKind::InvalidRequest,
        };
        self.state
            .events
            .track_event(
                EventRecord::new(kind, operation.as_str(), err.to_string())
                    .with_data("response_code", format!("{:?}", err.response_code())),
            )
            .await;
    }

    pub(crate) async fn track(&self, kind: EventKind, operation: Operation, message: String) {
        self.state
            .events
            .track_event(EventRecord::new(kind, operation.as_str(), message))
            .await;
    }
}

/// 作业键必须合法，否则按任务描述错误拒绝
pub(crate) fn assert_valid_key(key: &JobKey) -> SchedulerResult<()> {
    if key.is_valid() {
        Ok(())
    } else {
        Err(SchedulerError::task_description(format!(
            "Job key {key} is invalid: role, environment and name must match [\\w\\-.]+"
        )))
    }
}

pub(crate) fn single_role(role: &str) -> BTreeSet<String> {
    BTreeSet::from([role.to_string()])
}
