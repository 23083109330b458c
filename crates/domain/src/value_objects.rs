use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::entities::JobConfiguration;

/// (CPU, RAM, disk) 资源向量，既用作配额也用作消耗总量
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceAggregate {
    pub num_cpus: f64,
    pub ram_mb: i64,
    pub disk_mb: i64,
}

impl ResourceAggregate {
    pub const EMPTY: ResourceAggregate = ResourceAggregate {
        num_cpus: 0.0,
        ram_mb: 0,
        disk_mb: 0,
    };

    pub fn new(num_cpus: f64, ram_mb: i64, disk_mb: i64) -> Self {
        Self {
            num_cpus,
            ram_mb,
            disk_mb,
        }
    }

    /// 按实例数放大，整数分量溢出时饱和
    pub fn scale(&self, factor: i32) -> Self {
        Self {
            num_cpus: self.num_cpus * f64::from(factor),
            ram_mb: self.ram_mb.saturating_mul(i64::from(factor)),
            disk_mb: self.disk_mb.saturating_mul(i64::from(factor)),
        }
    }

    /// 任一整数分量溢出时返回 `None`
    pub fn checked_scale(&self, factor: i32) -> Option<Self> {
        Some(Self {
            num_cpus: self.num_cpus * f64::from(factor),
            ram_mb: self.ram_mb.checked_mul(i64::from(factor))?,
            disk_mb: self.disk_mb.checked_mul(i64::from(factor))?,
        })
    }

    pub fn checked_add(&self, other: &ResourceAggregate) -> Option<Self> {
        Some(Self {
            num_cpus: self.num_cpus + other.num_cpus,
            ram_mb: self.ram_mb.checked_add(other.ram_mb)?,
            disk_mb: self.disk_mb.checked_add(other.disk_mb)?,
        })
    }

    /// 任意一个分量超过限额即视为超出
    pub fn exceeds(&self, limit: &ResourceAggregate) -> bool {
        self.num_cpus > limit.num_cpus || self.ram_mb > limit.ram_mb || self.disk_mb > limit.disk_mb
    }

    pub fn has_negative(&self) -> bool {
        self.num_cpus < 0.0 || self.ram_mb < 0 || self.disk_mb < 0
    }
}

// 汇总视图使用饱和加法，准入检查使用 checked_add
impl Add for ResourceAggregate {
    type Output = ResourceAggregate;

    fn add(self, other: ResourceAggregate) -> ResourceAggregate {
        ResourceAggregate {
            num_cpus: self.num_cpus + other.num_cpus,
            ram_mb: self.ram_mb.saturating_add(other.ram_mb),
            disk_mb: self.disk_mb.saturating_add(other.disk_mb),
        }
    }
}

impl AddAssign for ResourceAggregate {
    fn add_assign(&mut self, other: ResourceAggregate) {
        *self = *self + other;
    }
}

impl Sum for ResourceAggregate {
    fn sum<I: Iterator<Item = ResourceAggregate>>(iter: I) -> Self {
        iter.fold(ResourceAggregate::EMPTY, Add::add)
    }
}

impl fmt::Display for ResourceAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ResourceAggregate(numCpus: {}, ramMb: {}, diskMb: {})",
            self.num_cpus, self.ram_mb, self.disk_mb
        )
    }
}

/// 某个角色的配额与当前消耗
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QuotaInfo {
    pub quota: ResourceAggregate,
    pub prod_consumption: ResourceAggregate,
    pub non_prod_consumption: ResourceAggregate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub active_task_count: usize,
    pub pending_task_count: usize,
    pub finished_task_count: usize,
    pub failed_task_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job: JobConfiguration,
    pub stats: JobStats,
    #[serde(default)]
    pub next_cron_run_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleSummary {
    pub role: String,
    pub job_count: usize,
    pub cron_job_count: usize,
}
