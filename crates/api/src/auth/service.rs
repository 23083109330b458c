use std::collections::{BTreeSet, HashMap};

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use scheduler_core::{ApiKeyEntry, AuthConfig};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{
    AuditCheck, AuthError, Capability, SessionContext, SessionKey, SessionValidator, AUDIT_TARGET,
};

/// JWT载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_hours: i64,
}

impl JwtService {
    pub fn new(secret: &str, expiration_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            expiration_hours,
        }
    }

    pub fn generate_token(
        &self,
        identity: &str,
        roles: &[String],
        capabilities: &[Capability],
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.expiration_hours);

        let claims = Claims {
            sub: identity.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            roles: roles.to_vec(),
            capabilities: capabilities.iter().map(|c| c.as_str().to_string()).collect(),
        };

        self.encode_claims(&claims)
    }

    pub fn encode_claims(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::default(), claims, &self.encoding_key)
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let validation = Validation::new(Algorithm::HS256);
        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }
}

/// 计算API密钥的存储形式：sha256摘要的base64编码
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    general_purpose::STANDARD.encode(hasher.finalize())
}

pub struct ApiKeyService {
    keys: HashMap<String, ApiKeyEntry>,
}

impl ApiKeyService {
    pub fn new(entries: &[ApiKeyEntry]) -> Self {
        let keys = entries
            .iter()
            .map(|entry| (entry.key_hash.clone(), entry.clone()))
            .collect();
        Self { keys }
    }

    pub fn validate_api_key(&self, api_key: &str) -> Result<&ApiKeyEntry, AuthError> {
        self.keys
            .get(&hash_api_key(api_key))
            .filter(|entry| entry.is_active)
            .ok_or(AuthError::InvalidApiKey)
    }

    pub fn generate_api_key() -> String {
        use rand::Rng;
        let mut rng = rand::rng();
        let key: [u8; 32] = rng.random();
        general_purpose::STANDARD.encode(key)
    }
}

/// 基于配置中的API密钥表和JWT密钥的会话校验器
pub struct CredentialSessionValidator {
    jwt_service: JwtService,
    api_key_service: ApiKeyService,
}

impl CredentialSessionValidator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            jwt_service: JwtService::new(&config.jwt_secret, config.jwt_expiration_hours),
            api_key_service: ApiKeyService::new(&config.api_keys),
        }
    }

    pub fn jwt_service(&self) -> &JwtService {
        &self.jwt_service
    }

    fn resolve(&self, session: &SessionKey) -> Result<SessionContext, AuthError> {
        match session {
            SessionKey::ApiKey(raw) => {
                let entry = self.api_key_service.validate_api_key(raw)?;
                Ok(SessionContext {
                    identity: entry.name.clone(),
                    roles: entry.roles.iter().cloned().collect(),
                    capabilities: parse_capabilities(&entry.capabilities),
                })
            }
            SessionKey::Bearer(token) => {
                let claims = self.jwt_service.validate_token(token).map_err(|err| {
                    debug!("JWT校验失败: {}", err);
                    match err.kind() {
                        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                            AuthError::ExpiredToken
                        }
                        _ => AuthError::InvalidToken,
                    }
                })?;
                Ok(SessionContext {
                    identity: claims.sub,
                    roles: claims.roles.into_iter().collect(),
                    capabilities: parse_capabilities(&claims.capabilities),
                })
            }
        }
    }
}

fn parse_capabilities(values: &[String]) -> BTreeSet<Capability> {
    values
        .iter()
        .filter_map(|value| match value.parse::<Capability>() {
            Ok(capability) => Some(capability),
            Err(err) => {
                warn!("忽略无法识别的能力: {}", err);
                None
            }
        })
        .collect()
}

impl SessionValidator for CredentialSessionValidator {
    fn check_authenticated(
        &self,
        session: &SessionKey,
        target_roles: &BTreeSet<String>,
    ) -> Result<SessionContext, AuthError> {
        let context = self.resolve(session)?;
        if context.belongs_to_any(target_roles) {
            Ok(context)
        } else {
            Err(AuthError::NotInRoles {
                identity: context.identity,
                roles: target_roles.iter().cloned().collect::<Vec<_>>().join(", "),
            })
        }
    }

    fn check_authorized(
        &self,
        session: &SessionKey,
        capability: Capability,
        audit: AuditCheck,
    ) -> Result<SessionContext, AuthError> {
        let context = self.resolve(session)?;
        let granted = context.has_capability(capability);
        if audit == AuditCheck::Required {
            info!(
                target: AUDIT_TARGET,
                identity = %context.identity,
                capability = %capability,
                granted,
                "特权能力检查"
            );
        }

        if granted {
            Ok(context)
        } else {
            Err(AuthError::MissingCapability {
                identity: context.identity,
                capability,
            })
        }
    }
}
