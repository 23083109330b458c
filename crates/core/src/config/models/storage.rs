use serde::{Deserialize, Serialize};

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 快照文件路径，未配置时快照只记录日志
    pub snapshot_path: Option<String>,
    /// 内存中保留的备份数量
    pub backup_retention: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            backup_retention: 24,
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backup_retention == 0 {
            return Err(anyhow::anyhow!("备份保留数量必须大于0"));
        }

        if let Some(path) = &self.snapshot_path {
            if path.trim().is_empty() {
                return Err(anyhow::anyhow!("快照路径不能为空字符串"));
            }
        }

        Ok(())
    }
}
