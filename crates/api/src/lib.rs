//! # Scheduler API
//!
//! 集群调度器的变更控制入口。所有改变调度状态的请求都经过 [`SchedulerApi`]，
//! 按统一的顺序执行：
//!
//! ```text
//! 请求 → 授权(策略表) → 配置清洗 → 锁校验 → 配额准入 → 单次存储写入 → 响应
//! ```
//!
//! ## 模块
//!
//! - [`auth`]: 会话校验，API密钥与JWT两种凭证
//! - [`policy`]: 操作 → 授权要求 的声明式策略表
//! - [`coordinator`]: 协调器本体与结构化事件记录
//! - [`handlers`]: 各操作的处理逻辑，包括CAS配置重写
//! - [`request`]: 请求信封与分发
//! - [`response`]: 响应信封与响应码
//!
//! ## 响应码
//!
//! 每个响应只携带一个响应码：`OK`、`INVALID_REQUEST`、`ERROR`、`AUTH_FAILED`、
//! `LOCK_ERROR` 或 `WARNING`（仅用于部分失败的重写批次）。

pub mod auth;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod policy;
pub mod request;
pub mod response;
pub mod state;

pub use auth::{
    AuthError, Capability, CredentialSessionValidator, SessionContext, SessionKey,
    SessionValidator,
};
pub use coordinator::SchedulerApi;
pub use error::{ApiError, ApiResult};
pub use handlers::AddInstancesConfig;
pub use policy::{policy_for, AuthPolicy, Operation};
pub use request::Request;
pub use response::{ApiVersion, Response, ResponseCode, ResponseResult, CURRENT_API_VERSION};
pub use state::AppState;
