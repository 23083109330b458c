use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// "json" 或 "pretty"
    pub log_format: String,
    /// 事件追踪器保留的最大事件数
    pub event_buffer_size: usize,
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            event_buffer_size: 1000,
            metrics_enabled: true,
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.log_level
            .parse::<LogLevel>()
            .map_err(|e| anyhow::anyhow!("{e}"))?;

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(anyhow::anyhow!("不支持的日志格式: {}", self.log_format));
        }

        if self.event_buffer_size == 0 {
            return Err(anyhow::anyhow!("事件缓冲区大小必须大于0"));
        }

        Ok(())
    }
}
