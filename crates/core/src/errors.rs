use thiserror::Error;

/// 调度器错误类型定义
///
/// 每个变体对应变更控制核心的一类失败，由API层统一翻译为响应码。
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchedulerError {
    #[error("{0}")]
    AuthFailed(String),

    #[error("{0}")]
    Lock(String),

    #[error("{0}")]
    TaskDescription(String),

    #[error("{0}")]
    Schedule(String),

    #[error("{0}")]
    Quota(String),

    #[error("{0}")]
    Cron(String),

    #[error("{0}")]
    Recovery(String),

    #[error("{0}")]
    Storage(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn lock<S: Into<String>>(msg: S) -> Self {
        Self::Lock(msg.into())
    }
    pub fn task_description<S: Into<String>>(msg: S) -> Self {
        Self::TaskDescription(msg.into())
    }
    pub fn schedule<S: Into<String>>(msg: S) -> Self {
        Self::Schedule(msg.into())
    }
    pub fn quota<S: Into<String>>(msg: S) -> Self {
        Self::Quota(msg.into())
    }
    pub fn cron<S: Into<String>>(msg: S) -> Self {
        Self::Cron(msg.into())
    }
    pub fn recovery<S: Into<String>>(msg: S) -> Self {
        Self::Recovery(msg.into())
    }
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// 是否属于请求本身的问题（校验或前置条件失败），而非后端故障
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            SchedulerError::TaskDescription(_)
                | SchedulerError::Schedule(_)
                | SchedulerError::Quota(_)
                | SchedulerError::Cron(_)
        )
    }

    /// 是否为不可恢复的内部一致性错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::Internal(_) | SchedulerError::Configuration(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        SchedulerError::Storage(err.to_string())
    }
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
