mod common;

use std::collections::BTreeSet;

use common::*;
use scheduler_api::{ResponseCode, ResponseResult};
use scheduler_core::{EventKind, StorageConfig};
use scheduler_domain::{MaintenanceMode, ResourceAggregate, TaskQuery};
use scheduler_testing_utils::{
    fetch_quota, fetch_tasks, seed_tasks, JobConfigurationBuilder, ScheduledTaskBuilder,
    TaskConfigBuilder,
};

#[tokio::test]
async fn test_negative_quota_is_rejected_and_not_persisted() {
    let h = harness();
    let response = h
        .api
        .set_quota(
            "r1".to_string(),
            ResourceAggregate::new(-1.0, 0, 0),
            &session(PROVISIONER_KEY),
        )
        .await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);
    assert_eq!(fetch_quota(&h.storage, "r1").await, None);
    assert_eq!(h.api.events().count(EventKind::QuotaRejected).await, 1);
}

#[tokio::test]
async fn test_quota_requires_provisioner() {
    let h = harness();
    let quota = ResourceAggregate::new(8.0, 4096, 8192);

    let response = h.api.set_quota(ROLE.to_string(), quota, &alice()).await;
    assert_eq!(response.response_code, ResponseCode::AuthFailed);

    let response = h.api.set_quota(ROLE.to_string(), quota, &root()).await;
    assert!(response.is_ok(), "{response:?}");
    assert_eq!(fetch_quota(&h.storage, ROLE).await, Some(quota));

    let response = h.api.get_quota("  ".to_string()).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);
}

#[tokio::test]
async fn test_quota_info_is_stable_without_task_changes() {
    let h = harness();
    let job = JobConfigurationBuilder::new(ROLE, "prod", "web")
        .with_instances(3)
        .build();
    assert!(h.api.create_job(job, None, &alice()).await.is_ok());

    let first = h.api.get_quota(ROLE.to_string()).await;
    let second = h.api.get_quota(ROLE.to_string()).await;
    assert_eq!(first, second);
    match first.result {
        Some(ResponseResult::Quota(info)) => {
            assert_eq!(info.non_prod_consumption, ResourceAggregate::new(3.0, 384, 768));
            assert_eq!(info.quota, ResourceAggregate::EMPTY);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_maintenance_flow() {
    let h = harness();
    let maintainer = session(MAINTAINER_KEY);
    let busy = ScheduledTaskBuilder::new(TaskConfigBuilder::new(ROLE, "prod", "web").build(), 0)
        .running_on("host-a")
        .build();
    seed_tasks(&h.storage, vec![busy]).await.unwrap();
    let hosts = BTreeSet::from(["host-a".to_string(), "host-b".to_string()]);

    let response = h.api.start_maintenance(hosts.clone(), &alice()).await;
    assert_eq!(response.response_code, ResponseCode::AuthFailed);

    let response = h.api.start_maintenance(hosts.clone(), &maintainer).await;
    match response.result {
        Some(ResponseResult::HostStatuses(statuses)) => {
            assert!(statuses.values().all(|m| *m == MaintenanceMode::Scheduled));
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let response = h.api.drain_hosts(hosts.clone(), &maintainer).await;
    match response.result {
        Some(ResponseResult::HostStatuses(statuses)) => {
            assert_eq!(statuses["host-a"], MaintenanceMode::Draining);
            assert_eq!(statuses["host-b"], MaintenanceMode::Drained);
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let response = h.api.maintenance_status(hosts.clone(), &maintainer).await;
    match response.result {
        Some(ResponseResult::HostStatuses(statuses)) => {
            assert_eq!(statuses["host-a"], MaintenanceMode::Draining);
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let response = h.api.end_maintenance(hosts, &maintainer).await;
    match response.result {
        Some(ResponseResult::HostStatuses(statuses)) => {
            assert!(statuses.values().all(|m| *m == MaintenanceMode::None));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_backup_and_recovery() {
    let h = harness();
    let job = JobConfigurationBuilder::new(ROLE, "prod", "web")
        .with_instances(2)
        .build();
    assert!(h.api.create_job(job, None, &alice()).await.is_ok());

    let response = h.api.perform_backup(&alice()).await;
    assert_eq!(response.response_code, ResponseCode::AuthFailed);
    assert!(h.api.perform_backup(&root()).await.is_ok());

    let backups = match h.api.list_backups(&root()).await.result {
        Some(ResponseResult::Backups(backups)) => backups,
        other => panic!("unexpected result: {other:?}"),
    };
    assert_eq!(backups.len(), 1);

    // 备份之后的变更会被恢复覆盖
    let extra = JobConfigurationBuilder::new(ROLE, "prod", "batch").build();
    assert!(h.api.create_job(extra, None, &alice()).await.is_ok());
    assert_eq!(fetch_tasks(&h.storage, &TaskQuery::unscoped()).await.len(), 3);

    let response = h.api.query_recovery(TaskQuery::unscoped(), &root()).await;
    assert_eq!(response.response_code, ResponseCode::Error);

    assert!(h.api.stage_recovery(backups[0].clone(), &root()).await.is_ok());
    let response = h.api.query_recovery(TaskQuery::unscoped(), &root()).await;
    match response.result {
        Some(ResponseResult::QueryRecovery(tasks)) => assert_eq!(tasks.len(), 2),
        other => panic!("unexpected result: {other:?}"),
    }

    let mut first_instance = TaskQuery::unscoped();
    first_instance.instance_ids = BTreeSet::from([0]);
    assert!(h
        .api
        .delete_recovery_tasks(first_instance, &root())
        .await
        .is_ok());
    assert!(h.api.commit_recovery(&root()).await.is_ok());

    let tasks = fetch_tasks(&h.storage, &TaskQuery::unscoped()).await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].instance_id(), 1);

    // 提交后暂存区为空，卸载仍然成功
    assert!(h.api.unload_recovery(&root()).await.is_ok());
    let response = h.api.query_recovery(TaskQuery::unscoped(), &root()).await;
    assert_eq!(response.response_code, ResponseCode::Error);

    let response = h.api.stage_recovery("missing".to_string(), &root()).await;
    assert_eq!(response.response_code, ResponseCode::Error);
    assert_eq!(response.message(), "Unknown backup: missing");
    assert_eq!(h.api.events().count(EventKind::BackendFailure).await, 3);
}

#[tokio::test]
async fn test_snapshot_writes_configured_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    let mut config = test_config();
    config.storage = StorageConfig {
        snapshot_path: Some(path.to_string_lossy().into_owned()),
        backup_retention: 2,
    };
    let h = harness_with_config(&config);

    let job = JobConfigurationBuilder::new(ROLE, "prod", "web").build();
    assert!(h.api.create_job(job, None, &alice()).await.is_ok());

    let response = h.api.snapshot(&alice()).await;
    assert_eq!(response.response_code, ResponseCode::AuthFailed);
    assert!(!path.exists());

    let response = h.api.snapshot(&root()).await;
    assert_eq!(response.message(), "Compaction successful.");
    assert!(path.exists());
}
