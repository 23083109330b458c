pub mod event_tracker;
pub mod log_level;

pub use event_tracker::{EventCategory, EventKind, EventRecord, EventTracker, EventTrackerConfig};
pub use log_level::LogLevel;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// 初始化日志系统
///
/// `RUST_LOG` 存在时优先于配置中的日志级别。
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let level: LogLevel = config
        .log_level
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.log_format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        other => {
            return Err(anyhow::anyhow!("不支持的日志格式: {other}"));
        }
    }

    Ok(())
}
