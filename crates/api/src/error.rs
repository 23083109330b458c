use scheduler_core::SchedulerError;

use crate::auth::AuthError;
use crate::response::{Response, ResponseCode};

/// 协调器边界上的错误，每个变体都映射到唯一的响应码
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Scheduler(#[from] SchedulerError),

    #[error("{0}")]
    Authentication(#[from] AuthError),

    /// 请求形状本身不合法，例如空白的作业名
    #[error("{0}")]
    InvalidRequest(String),
}

impl ApiError {
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn response_code(&self) -> ResponseCode {
        match self {
            ApiError::Authentication(_) => ResponseCode::AuthFailed,
            ApiError::InvalidRequest(_) => ResponseCode::InvalidRequest,
            ApiError::Scheduler(err) => match err {
                SchedulerError::AuthFailed(_) => ResponseCode::AuthFailed,
                SchedulerError::Lock(_) => ResponseCode::LockError,
                SchedulerError::TaskDescription(_)
                | SchedulerError::Schedule(_)
                | SchedulerError::Quota(_)
                | SchedulerError::Cron(_) => ResponseCode::InvalidRequest,
                SchedulerError::Recovery(_)
                | SchedulerError::Storage(_)
                | SchedulerError::Configuration(_)
                | SchedulerError::Serialization(_)
                | SchedulerError::Internal(_) => ResponseCode::Error,
            },
        }
    }

    /// 在错误消息前加上上下文前缀，响应码不变
    pub fn prefixed(self, prefix: &str) -> Self {
        match self {
            ApiError::Scheduler(err) => {
                let message = format!("{prefix}{err}");
                ApiError::Scheduler(match err {
                    SchedulerError::AuthFailed(_) => SchedulerError::AuthFailed(message),
                    SchedulerError::Lock(_) => SchedulerError::Lock(message),
                    SchedulerError::TaskDescription(_) => SchedulerError::TaskDescription(message),
                    SchedulerError::Schedule(_) => SchedulerError::Schedule(message),
                    SchedulerError::Quota(_) => SchedulerError::Quota(message),
                    SchedulerError::Cron(_) => SchedulerError::Cron(message),
                    SchedulerError::Recovery(_) => SchedulerError::Recovery(message),
                    SchedulerError::Storage(_) => SchedulerError::Storage(message),
                    SchedulerError::Configuration(_)
                    | SchedulerError::Serialization(_)
                    | SchedulerError::Internal(_) => SchedulerError::Internal(message),
                })
            }
            ApiError::InvalidRequest(msg) => ApiError::InvalidRequest(format!("{prefix}{msg}")),
            other => other,
        }
    }
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        Response::error(err.response_code(), err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
