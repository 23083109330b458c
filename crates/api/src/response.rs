use scheduler_domain::{
    HostStatuses, JobConfiguration, JobSummary, Lock, QuotaInfo, RoleSummary, ScheduledTask,
    TaskConfig,
};
use serde::{Deserialize, Serialize};

/// 当前API版本
pub const CURRENT_API_VERSION: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseCode {
    Ok,
    InvalidRequest,
    Error,
    AuthFailed,
    LockError,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiVersion {
    pub major: i32,
}

/// 响应中携带的类型化结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ResponseResult {
    PopulateJob(Vec<TaskConfig>),
    ScheduleStatus(Vec<ScheduledTask>),
    RoleSummary(Vec<RoleSummary>),
    JobSummary(Vec<JobSummary>),
    Jobs(Vec<JobConfiguration>),
    Quota(QuotaInfo),
    HostStatuses(HostStatuses),
    Backups(Vec<String>),
    QueryRecovery(Vec<ScheduledTask>),
    Version(ApiVersion),
    Lock(Lock),
}

/// 响应信封：一个响应码、可选的消息和可选的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub response_code: ResponseCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResponseResult>,
    /// 不影响响应码的弃用提示
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Response {
    pub fn new(response_code: ResponseCode) -> Self {
        Self {
            response_code,
            message: None,
            result: None,
            warnings: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(ResponseCode::Ok)
    }

    pub fn ok_with_message(message: impl Into<String>) -> Self {
        Self::ok().with_message(message)
    }

    pub fn ok_with_result(result: ResponseResult) -> Self {
        Self::ok().with_result(result)
    }

    pub fn error(response_code: ResponseCode, message: impl Into<String>) -> Self {
        Self::new(response_code).with_message(message)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_result(mut self, result: ResponseResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.response_code == ResponseCode::Ok
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}
