use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use scheduler_domain::{
    AssignedTask, MutableStoreProvider, ScheduleStatus, ScheduledTask, TaskConfig, TaskEvent,
    TaskQuery,
};
use tracing::{debug, info};

/// 任务状态变更，所有方法都在调用方打开的写事务中执行
#[derive(Debug, Clone, Default)]
pub struct StateManager {
    scheduler_name: Option<String>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scheduler_name(name: impl Into<String>) -> Self {
        Self {
            scheduler_name: Some(name.into()),
        }
    }

    /// 为每个实例插入一个PENDING任务，返回新任务ID
    pub fn insert_pending_tasks(
        &self,
        store: &mut dyn MutableStoreProvider,
        configs: &BTreeMap<i32, TaskConfig>,
    ) -> Vec<String> {
        let now_ms = Utc::now().timestamp_millis();
        let tasks: Vec<ScheduledTask> = configs
            .iter()
            .map(|(instance_id, config)| {
                let mut task = ScheduledTask::pending(config.clone(), *instance_id, now_ms);
                if let Some(event) = task.task_events.last_mut() {
                    event.scheduler = self.scheduler_name.clone();
                }
                task
            })
            .collect();

        let task_ids: Vec<String> = tasks.iter().map(|t| t.task_id().to_string()).collect();
        store.task_store_mut().save_tasks(tasks);
        info!("已插入 {} 个等待中的任务", task_ids.len());
        task_ids
    }

    /// 按状态转换表把匹配的任务迁移到目标状态，返回实际发生变化的任务数
    ///
    /// 目标为KILLING时，尚未分配的任务直接变为KILLED；目标为RESTARTING时只有
    /// 已分配或运行中的任务会迁移。其他目标状态按强制转换处理。
    pub fn change_state(
        &self,
        store: &mut dyn MutableStoreProvider,
        query: &TaskQuery,
        target: ScheduleStatus,
        audit_message: Option<String>,
    ) -> usize {
        self.transition(store, query, audit_message, |from| {
            resolve_transition(from, target)
        })
    }

    /// 跳过状态转换表，直接设置任务状态
    pub fn force_state(
        &self,
        store: &mut dyn MutableStoreProvider,
        task_id: &str,
        target: ScheduleStatus,
        audit_message: Option<String>,
    ) -> usize {
        let query = TaskQuery::task_scoped([task_id]);
        self.transition(store, &query, audit_message, |from| {
            (from != target).then_some(target)
        })
    }

    /// 把任务分配到主机，只对未分配的活跃任务生效
    pub fn assign_task(
        &self,
        store: &mut dyn MutableStoreProvider,
        task_id: &str,
        slave_host: &str,
        slave_id: &str,
        assigned_ports: BTreeMap<String, i32>,
    ) -> Option<AssignedTask> {
        let now_ms = Utc::now().timestamp_millis();
        let query = TaskQuery::task_scoped([task_id]);
        let scheduler = self.scheduler_name.clone();
        let mutated = store.task_store_mut().mutate_tasks(&query, &mut |task: &ScheduledTask| {
            if !task.status.is_unassigned() {
                return None;
            }
            let mut assigned = task.clone();
            assigned.assigned_task.slave_host = Some(slave_host.to_string());
            assigned.assigned_task.slave_id = Some(slave_id.to_string());
            assigned.assigned_task.assigned_ports = assigned_ports.clone();
            assigned.status = ScheduleStatus::Assigned;
            assigned.task_events.push(TaskEvent {
                timestamp_ms: now_ms,
                status: ScheduleStatus::Assigned,
                message: None,
                scheduler: scheduler.clone(),
            });
            Some(assigned)
        });

        mutated.into_iter().next().map(|task| task.assigned_task)
    }

    /// 删除任务，未知ID被忽略
    pub fn delete_tasks(&self, store: &mut dyn MutableStoreProvider, task_ids: &BTreeSet<String>) {
        store.task_store_mut().delete_tasks(task_ids);
        debug!("已删除 {} 个任务", task_ids.len());
    }

    fn transition(
        &self,
        store: &mut dyn MutableStoreProvider,
        query: &TaskQuery,
        audit_message: Option<String>,
        resolve: impl Fn(ScheduleStatus) -> Option<ScheduleStatus>,
    ) -> usize {
        let now_ms = Utc::now().timestamp_millis();
        let scheduler = self.scheduler_name.clone();
        let changed = store.task_store_mut().mutate_tasks(query, &mut |task: &ScheduledTask| {
            let next = resolve(task.status)?;
            let mut updated = task.clone();
            updated.status = next;
            updated.task_events.push(TaskEvent {
                timestamp_ms: now_ms,
                status: next,
                message: audit_message.clone(),
                scheduler: scheduler.clone(),
            });
            Some(updated)
        });

        for task in &changed {
            debug!("任务 {} 状态变更为 {}", task.task_id(), task.status);
        }
        changed.len()
    }
}

/// 状态转换表，返回None表示不发生转换
pub fn resolve_transition(from: ScheduleStatus, target: ScheduleStatus) -> Option<ScheduleStatus> {
    match target {
        ScheduleStatus::Killing | ScheduleStatus::Killed => {
            if from.is_unassigned() {
                Some(ScheduleStatus::Killed)
            } else if from.is_active() && from != ScheduleStatus::Killing {
                Some(ScheduleStatus::Killing)
            } else {
                None
            }
        }
        ScheduleStatus::Restarting => matches!(
            from,
            ScheduleStatus::Assigned | ScheduleStatus::Starting | ScheduleStatus::Running
        )
        .then_some(ScheduleStatus::Restarting),
        _ => (from != target).then_some(target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kill_transitions() {
        use ScheduleStatus::*;
        assert_eq!(resolve_transition(Pending, Killing), Some(Killed));
        assert_eq!(resolve_transition(Throttled, Killing), Some(Killed));
        assert_eq!(resolve_transition(Init, Killing), Some(Killed));
        assert_eq!(resolve_transition(Running, Killing), Some(Killing));
        assert_eq!(resolve_transition(Assigned, Killing), Some(Killing));
        assert_eq!(resolve_transition(Killing, Killing), None);
        assert_eq!(resolve_transition(Finished, Killing), None);
    }

    #[test]
    fn test_restart_transitions() {
        use ScheduleStatus::*;
        assert_eq!(resolve_transition(Running, Restarting), Some(Restarting));
        assert_eq!(resolve_transition(Assigned, Restarting), Some(Restarting));
        assert_eq!(resolve_transition(Pending, Restarting), None);
        assert_eq!(resolve_transition(Killed, Restarting), None);
    }

    #[test]
    fn test_other_targets_are_direct() {
        use ScheduleStatus::*;
        assert_eq!(resolve_transition(Running, Failed), Some(Failed));
        assert_eq!(resolve_transition(Failed, Failed), None);
    }
}
