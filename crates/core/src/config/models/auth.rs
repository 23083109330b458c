use serde::{Deserialize, Serialize};

fn default_jwt_secret() -> String {
    "your-secret-key-change-this-in-production".to_string()
}

fn default_jwt_expiration_hours() -> i64 {
    24
}

/// 会话认证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiration_hours")]
    pub jwt_expiration_hours: i64,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
}

/// 一个已注册的API密钥
///
/// `key_hash` 是原始密钥的 sha256 摘要的 base64 编码，配置中从不保存明文密钥。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiKeyEntry {
    pub name: String,
    pub key_hash: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// ROOT / PROVISIONER / MACHINE_MAINTAINER
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            jwt_expiration_hours: default_jwt_expiration_hours(),
            api_keys: Vec::new(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.jwt_secret.len() < 16 {
            return Err(anyhow::anyhow!("JWT密钥长度不能少于16个字符"));
        }

        if self.jwt_expiration_hours <= 0 {
            return Err(anyhow::anyhow!("JWT过期时间必须大于0"));
        }

        for entry in &self.api_keys {
            if entry.name.trim().is_empty() {
                return Err(anyhow::anyhow!("API密钥名称不能为空"));
            }
            if entry.key_hash.trim().is_empty() {
                return Err(anyhow::anyhow!("API密钥 {} 缺少 key_hash", entry.name));
            }
        }

        Ok(())
    }
}
