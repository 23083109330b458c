#![allow(dead_code)]

use std::sync::Arc;

use scheduler_api::auth::hash_api_key;
use scheduler_api::{AppState, CredentialSessionValidator, SchedulerApi, SessionKey};
use scheduler_core::{ApiKeyEntry, AppConfig, AuthConfig};
use scheduler_infrastructure::MemStorage;

pub const ROLE: &str = "www-data";
pub const OTHER_ROLE: &str = "mesos";

pub const ALICE_KEY: &str = "alice-secret";
pub const MALLORY_KEY: &str = "mallory-secret";
pub const ROOT_KEY: &str = "ops-secret";
pub const PROVISIONER_KEY: &str = "provisioner-secret";
pub const MAINTAINER_KEY: &str = "maintainer-secret";
pub const REVOKED_KEY: &str = "revoked-secret";

pub struct Harness {
    pub api: SchedulerApi,
    pub storage: Arc<MemStorage>,
}

fn entry(name: &str, raw: &str, roles: &[&str], capabilities: &[&str]) -> ApiKeyEntry {
    ApiKeyEntry {
        name: name.to_string(),
        key_hash: hash_api_key(raw),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        is_active: true,
    }
}

pub fn test_config() -> AppConfig {
    let mut revoked = entry("revoked", REVOKED_KEY, &[ROLE], &[]);
    revoked.is_active = false;

    AppConfig {
        auth: AuthConfig {
            jwt_secret: "integration-test-secret-key".to_string(),
            jwt_expiration_hours: 1,
            api_keys: vec![
                entry("alice", ALICE_KEY, &[ROLE], &[]),
                entry("mallory", MALLORY_KEY, &[OTHER_ROLE], &[]),
                entry("ops", ROOT_KEY, &[], &["ROOT"]),
                entry("provisioner", PROVISIONER_KEY, &[], &["PROVISIONER"]),
                entry("maintainer", MAINTAINER_KEY, &[], &["MACHINE_MAINTAINER"]),
                revoked,
            ],
        },
        ..AppConfig::default()
    }
}

pub fn harness_with_config(config: &AppConfig) -> Harness {
    let storage = Arc::new(MemStorage::with_config(&config.storage));
    let validator = Arc::new(CredentialSessionValidator::new(&config.auth));
    let state = AppState::in_memory(storage.clone(), validator, config);
    Harness {
        api: SchedulerApi::new(state),
        storage,
    }
}

pub fn harness() -> Harness {
    harness_with_config(&test_config())
}

pub fn session(raw: &str) -> SessionKey {
    SessionKey::ApiKey(raw.to_string())
}

pub fn alice() -> SessionKey {
    session(ALICE_KEY)
}

pub fn mallory() -> SessionKey {
    session(MALLORY_KEY)
}

pub fn root() -> SessionKey {
    session(ROOT_KEY)
}
