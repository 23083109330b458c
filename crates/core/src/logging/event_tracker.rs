use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, trace, warn};

use crate::logging::log_level::LogLevel;

/// 变更控制核心的结构化事件追踪
///
/// 作为显式的可观测性上下文注入到协调器中，替代隐式的全局日志与计数器。
#[derive(Debug, Clone)]
pub struct EventTracker {
    events: Arc<RwLock<VecDeque<EventRecord>>>,
    config: EventTrackerConfig,
}

/// Individual event record
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EventRecord {
    pub timestamp_ms: i64,
    pub kind: EventKind,
    pub category: EventCategory,
    pub severity: LogLevel,
    /// Source component / operation name
    pub source: String,
    pub message: String,
    pub data: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EventKind {
    AuthFailed,
    LockConflict,
    LockAcquired,
    LockReleased,
    QuotaRejected,
    InvalidRequest,
    MutationApplied,
    RewriteFailed,
    BackendFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EventCategory {
    Security,
    Concurrency,
    Quota,
    Validation,
    Mutation,
    Storage,
}

#[derive(Debug, Clone)]
pub struct EventTrackerConfig {
    /// Maximum number of events to keep in memory
    pub max_events: usize,
    pub metrics_enabled: bool,
}

impl Default for EventTrackerConfig {
    fn default() -> Self {
        Self {
            max_events: 1000,
            metrics_enabled: true,
        }
    }
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AuthFailed => "auth_failed",
            EventKind::LockConflict => "lock_conflict",
            EventKind::LockAcquired => "lock_acquired",
            EventKind::LockReleased => "lock_released",
            EventKind::QuotaRejected => "quota_rejected",
            EventKind::InvalidRequest => "invalid_request",
            EventKind::MutationApplied => "mutation_applied",
            EventKind::RewriteFailed => "rewrite_failed",
            EventKind::BackendFailure => "backend_failure",
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            EventKind::AuthFailed => EventCategory::Security,
            EventKind::LockConflict | EventKind::LockAcquired | EventKind::LockReleased => {
                EventCategory::Concurrency
            }
            EventKind::QuotaRejected => EventCategory::Quota,
            EventKind::InvalidRequest => EventCategory::Validation,
            EventKind::MutationApplied | EventKind::RewriteFailed => EventCategory::Mutation,
            EventKind::BackendFailure => EventCategory::Storage,
        }
    }

    pub fn severity(&self) -> LogLevel {
        match self {
            EventKind::BackendFailure => LogLevel::Error,
            EventKind::AuthFailed
            | EventKind::LockConflict
            | EventKind::QuotaRejected
            | EventKind::RewriteFailed => LogLevel::Warn,
            EventKind::InvalidRequest => LogLevel::Debug,
            EventKind::LockAcquired | EventKind::LockReleased | EventKind::MutationApplied => {
                LogLevel::Info
            }
        }
    }
}

impl EventRecord {
    pub fn new(kind: EventKind, source: &str, message: impl Into<String>) -> Self {
        Self {
            timestamp_ms: Utc::now().timestamp_millis(),
            kind,
            category: kind.category(),
            severity: kind.severity(),
            source: source.to_string(),
            message: message.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

impl Default for EventTracker {
    fn default() -> Self {
        Self::with_config(EventTrackerConfig::default())
    }
}

impl EventTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EventTrackerConfig) -> Self {
        Self {
            events: Arc::new(RwLock::new(VecDeque::with_capacity(config.max_events))),
            config,
        }
    }

    /// 记录事件：写入内存环形缓冲区、输出tracing事件并累加指标
    pub async fn track_event(&self, event: EventRecord) {
        Self::emit(&event);

        if self.config.metrics_enabled {
            metrics::counter!("scheduler_events_total", "kind" => event.kind.as_str())
                .increment(1);
        }

        let mut events = self.events.write().await;
        events.push_back(event);
        while events.len() > self.config.max_events {
            events.pop_front();
        }
    }

    fn emit(event: &EventRecord) {
        let kind = event.kind.as_str();
        let data = serde_json::to_string(&event.data).unwrap_or_default();
        match event.severity {
            LogLevel::Error => error!(kind, source = %event.source, %data, "{}", event.message),
            LogLevel::Warn => warn!(kind, source = %event.source, %data, "{}", event.message),
            LogLevel::Info => info!(kind, source = %event.source, %data, "{}", event.message),
            LogLevel::Debug => debug!(kind, source = %event.source, %data, "{}", event.message),
            LogLevel::Trace => trace!(kind, source = %event.source, %data, "{}", event.message),
        }
    }

    pub async fn events(&self) -> Vec<EventRecord> {
        self.events.read().await.iter().cloned().collect()
    }

    pub async fn events_of_kind(&self, kind: EventKind) -> Vec<EventRecord> {
        self.events
            .read()
            .await
            .iter()
            .filter(|event| event.kind == kind)
            .cloned()
            .collect()
    }

    pub async fn count(&self, kind: EventKind) -> usize {
        self.events
            .read()
            .await
            .iter()
            .filter(|event| event.kind == kind)
            .count()
    }

    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}
