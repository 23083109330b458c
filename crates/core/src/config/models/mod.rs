pub mod app_config;
pub mod auth;
pub mod observability;
pub mod storage;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use auth::{ApiKeyEntry, AuthConfig};
pub use observability::ObservabilityConfig;
pub use storage::StorageConfig;
