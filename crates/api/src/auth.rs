//! 会话认证与授权
//!
//! 协调器只依赖 [`SessionValidator`] 的契约：校验调用方身份属于某个角色，或持有某项特权能力。
//! 凭证的具体来源（API密钥、JWT）由 [`service::CredentialSessionValidator`] 实现。

pub mod service;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use service::{hash_api_key, ApiKeyService, Claims, CredentialSessionValidator, JwtService};

/// 审计日志使用的tracing target
pub const AUDIT_TARGET: &str = "scheduler::audit";

/// 调用方出示的会话凭证
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SessionKey {
    ApiKey(String),
    Bearer(String),
}

/// 特权能力
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    /// 满足所有能力检查
    Root,
    Provisioner,
    MachineMaintainer,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Root => "ROOT",
            Capability::Provisioner => "PROVISIONER",
            Capability::MachineMaintainer => "MACHINE_MAINTAINER",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ROOT" => Ok(Capability::Root),
            "PROVISIONER" => Ok(Capability::Provisioner),
            "MACHINE_MAINTAINER" => Ok(Capability::MachineMaintainer),
            other => Err(AuthError::UnknownCapability(other.to_string())),
        }
    }
}

/// 能力检查是否需要写审计日志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditCheck {
    Required,
    None,
}

/// 通过校验的会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub identity: String,
    pub roles: BTreeSet<String>,
    pub capabilities: BTreeSet<Capability>,
}

impl SessionContext {
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&Capability::Root) || self.capabilities.contains(&capability)
    }

    /// 目标角色为空时任何已验证身份都满足
    pub fn belongs_to_any(&self, roles: &BTreeSet<String>) -> bool {
        roles.is_empty() || roles.iter().any(|role| self.roles.contains(role))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing session credentials")]
    MissingCredentials,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Invalid session token")]
    InvalidToken,

    #[error("Session token has expired")]
    ExpiredToken,

    #[error("{identity} is not authorized for roles: {roles}")]
    NotInRoles { identity: String, roles: String },

    #[error("{identity} does not hold capability {capability}")]
    MissingCapability {
        identity: String,
        capability: Capability,
    },

    #[error("Unknown capability: {0}")]
    UnknownCapability(String),
}

/// 会话校验契约
///
/// 失败总是以错误返回，从不静默降级为匿名身份。
pub trait SessionValidator: Send + Sync {
    fn check_authenticated(
        &self,
        session: &SessionKey,
        target_roles: &BTreeSet<String>,
    ) -> Result<SessionContext, AuthError>;

    fn check_authorized(
        &self,
        session: &SessionKey,
        capability: Capability,
        audit: AuditCheck,
    ) -> Result<SessionContext, AuthError>;
}
