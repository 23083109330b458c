mod common;

use std::collections::BTreeSet;

use common::*;
use scheduler_api::auth::JwtService;
use scheduler_api::{AddInstancesConfig, Request, ResponseCode, ResponseResult, SessionKey};
use scheduler_core::EventKind;
use scheduler_domain::{JobKey, ResourceAggregate, ScheduleStatus, TaskQuery};
use scheduler_testing_utils::{
    fetch_quota, fetch_tasks, seed_tasks, JobConfigurationBuilder, ScheduledTaskBuilder,
    TaskConfigBuilder,
};

fn web_key() -> JobKey {
    JobKey::new(ROLE, "prod", "web")
}

#[tokio::test]
async fn test_create_job_inserts_pending_tasks() {
    let h = harness();
    let job = JobConfigurationBuilder::new(ROLE, "prod", "web")
        .with_instances(3)
        .build();

    let response = h.api.create_job(job, None, &alice()).await;
    assert_eq!(response.response_code, ResponseCode::Ok, "{response:?}");
    assert!(response.message().contains("3 new tasks pending"));
    assert_eq!(response.message(), "3 new tasks pending for job www-data/prod/web");

    let tasks = fetch_tasks(&h.storage, &TaskQuery::job_scoped(&web_key())).await;
    assert_eq!(tasks.len(), 3);
    assert!(tasks.iter().all(|t| t.status == ScheduleStatus::Pending));
    assert_eq!(h.api.events().count(EventKind::MutationApplied).await, 1);
}

#[tokio::test]
async fn test_create_job_rejects_existing_job() {
    let h = harness();
    let job = JobConfigurationBuilder::new(ROLE, "prod", "web").build();

    assert!(h.api.create_job(job.clone(), None, &alice()).await.is_ok());
    let response = h.api.create_job(job, None, &alice()).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);
    assert_eq!(response.message(), "Job already exists: www-data/prod/web");
    assert_eq!(fetch_tasks(&h.storage, &TaskQuery::unscoped()).await.len(), 1);
}

#[tokio::test]
async fn test_create_job_rejects_cron_and_invalid_configs() {
    let h = harness();

    let cron = JobConfigurationBuilder::new(ROLE, "prod", "nightly")
        .with_cron("0 2 * * *")
        .build();
    let response = h.api.create_job(cron, None, &alice()).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);
    assert!(response.message().contains("scheduleCronJob"));

    let invalid = JobConfigurationBuilder::new(ROLE, "prod", "web")
        .with_instances(0)
        .build();
    let response = h.api.create_job(invalid, None, &alice()).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);
    assert!(response.message().contains("Instance count"));

    assert!(fetch_tasks(&h.storage, &TaskQuery::unscoped()).await.is_empty());
}

#[tokio::test]
async fn test_unauthorized_callers_are_rejected_without_side_effects() {
    let h = harness();
    let job = JobConfigurationBuilder::new(ROLE, "prod", "web").build();

    let response = h.api.create_job(job.clone(), None, &mallory()).await;
    assert_eq!(response.response_code, ResponseCode::AuthFailed);

    let response = h.api.create_job(job.clone(), None, &session("not-a-key")).await;
    assert_eq!(response.response_code, ResponseCode::AuthFailed);

    let response = h.api.create_job(job, None, &session(REVOKED_KEY)).await;
    assert_eq!(response.response_code, ResponseCode::AuthFailed);

    assert!(fetch_tasks(&h.storage, &TaskQuery::unscoped()).await.is_empty());
    assert_eq!(h.api.events().count(EventKind::AuthFailed).await, 3);
}

#[tokio::test]
async fn test_bearer_token_session() {
    let config = test_config();
    let h = harness_with_config(&config);
    let jwt = JwtService::new(&config.auth.jwt_secret, 1);
    let token = jwt
        .generate_token("carol", &[ROLE.to_string()], &[])
        .unwrap();

    let job = JobConfigurationBuilder::new(ROLE, "prod", "web").build();
    let response = h.api.create_job(job, None, &SessionKey::Bearer(token)).await;
    assert!(response.is_ok(), "{response:?}");

    let forged = JwtService::new("some-other-secret-value", 1)
        .generate_token("carol", &[ROLE.to_string()], &[])
        .unwrap();
    let job = JobConfigurationBuilder::new(ROLE, "prod", "batch").build();
    let response = h.api.create_job(job, None, &SessionKey::Bearer(forged)).await;
    assert_eq!(response.response_code, ResponseCode::AuthFailed);
}

#[tokio::test]
async fn test_dispatch_without_session_fails_auth() {
    let h = harness();
    let job = JobConfigurationBuilder::new(ROLE, "prod", "web").build();

    let response = h
        .api
        .dispatch(Request::CreateJob {
            job: job.clone(),
            lock: None,
            session: None,
        })
        .await;
    assert_eq!(response.response_code, ResponseCode::AuthFailed);

    let response = h
        .api
        .dispatch(Request::CreateJob {
            job,
            lock: None,
            session: Some(alice()),
        })
        .await;
    assert!(response.is_ok());

    let response = h.api.dispatch(Request::GetVersion).await;
    assert_eq!(
        response.result,
        Some(ResponseResult::Version(scheduler_api::ApiVersion { major: 3 }))
    );
}

#[tokio::test]
async fn test_production_capacity_is_quota_checked() {
    let h = harness();
    let job = JobConfigurationBuilder::new(ROLE, "prod", "db")
        .production(1.0, 128, 256)
        .with_instances(2)
        .build();

    let response = h.api.create_job(job.clone(), None, &alice()).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);
    assert!(response.message().contains("Insufficient resource quota"));
    assert_eq!(h.api.events().count(EventKind::QuotaRejected).await, 1);

    let quota = ResourceAggregate::new(4.0, 1024, 2048);
    let response = h
        .api
        .set_quota(ROLE.to_string(), quota, &session(PROVISIONER_KEY))
        .await;
    assert_eq!(response.message(), "Quota applied.");

    let response = h.api.create_job(job, None, &alice()).await;
    assert!(response.is_ok(), "{response:?}");

    let response = h.api.get_quota(ROLE.to_string()).await;
    match response.result {
        Some(ResponseResult::Quota(info)) => {
            assert_eq!(info.quota, quota);
            assert_eq!(info.prod_consumption, ResourceAggregate::new(2.0, 256, 512));
            assert_eq!(info.non_prod_consumption, ResourceAggregate::EMPTY);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_oversized_production_demand_is_rejected() {
    let h = harness();
    let job = JobConfigurationBuilder::new(ROLE, "prod", "big")
        .production(1.0, i64::MAX, 1)
        .with_instances(2)
        .build();

    let response = h.api.create_job(job, None, &alice()).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);
    assert!(response.message().contains("exceeds the representable range"));
    assert_eq!(h.api.events().count(EventKind::QuotaRejected).await, 1);
    assert!(fetch_tasks(&h.storage, &TaskQuery::unscoped()).await.is_empty());

    // 单个实例不溢出，按普通配额不足拒绝
    let single = JobConfigurationBuilder::new(ROLE, "prod", "big")
        .production(1.0, i64::MAX, 1)
        .build();
    let response = h.api.create_job(single, None, &alice()).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);
    assert!(response.message().contains("Insufficient resource quota"));

    let response = h.api.get_quota(ROLE.to_string()).await;
    assert!(response.is_ok(), "{response:?}");
}

#[tokio::test]
async fn test_non_production_jobs_skip_quota() {
    let h = harness();
    let job = JobConfigurationBuilder::new(ROLE, "devel", "scratch")
        .with_instances(10)
        .build();
    let response = h.api.create_job(job, None, &alice()).await;
    assert!(response.is_ok(), "{response:?}");
    assert_eq!(fetch_quota(&h.storage, ROLE).await, None);
}

#[tokio::test]
async fn test_add_instances() {
    let h = harness();
    let job = JobConfigurationBuilder::new(ROLE, "prod", "web")
        .with_instances(2)
        .build();
    assert!(h.api.create_job(job, None, &alice()).await.is_ok());

    let config = AddInstancesConfig {
        key: web_key(),
        task_config: TaskConfigBuilder::for_job(&web_key()).build(),
        instance_ids: BTreeSet::from([2, 3]),
    };
    let response = h.api.add_instances(config.clone(), None, &alice()).await;
    assert_eq!(response.message(), "Successfully added instances.");
    assert_eq!(
        fetch_tasks(&h.storage, &TaskQuery::job_scoped(&web_key())).await.len(),
        4
    );

    // 已活跃的实例不能重复添加
    let response = h.api.add_instances(config, None, &alice()).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);

    let empty = AddInstancesConfig {
        key: web_key(),
        task_config: TaskConfigBuilder::for_job(&web_key()).build(),
        instance_ids: BTreeSet::new(),
    };
    let response = h.api.add_instances(empty, None, &alice()).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);

    let mismatched = AddInstancesConfig {
        key: web_key(),
        task_config: TaskConfigBuilder::new(ROLE, "prod", "other").build(),
        instance_ids: BTreeSet::from([9]),
    };
    let response = h.api.add_instances(mismatched, None, &alice()).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);
    assert_eq!(
        fetch_tasks(&h.storage, &TaskQuery::job_scoped(&web_key())).await.len(),
        4
    );
}

#[tokio::test]
async fn test_restart_shards_preconditions() {
    let h = harness();
    let job = JobConfigurationBuilder::new(ROLE, "prod", "web")
        .with_instances(2)
        .build();
    assert!(h.api.create_job(job, None, &alice()).await.is_ok());

    let response = h
        .api
        .restart_shards(web_key(), BTreeSet::new(), None, &alice())
        .await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);

    let response = h
        .api
        .restart_shards(web_key(), BTreeSet::from([0, 5]), None, &alice())
        .await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);
    assert!(response.message().contains("[5]"));

    // 等待调度的分片不能重启，响应里如实报告数量
    let response = h
        .api
        .restart_shards(web_key(), BTreeSet::from([0, 1]), None, &alice())
        .await;
    assert!(response.is_ok(), "{response:?}");
    assert_eq!(
        response.message(),
        "Shards are restarting. 0 of 2 shards restarted."
    );

    let running = ScheduledTaskBuilder::new(TaskConfigBuilder::for_job(&web_key()).build(), 2)
        .running_on("host-a")
        .build();
    seed_tasks(&h.storage, vec![running]).await.unwrap();
    let response = h
        .api
        .restart_shards(web_key(), BTreeSet::from([1, 2]), None, &alice())
        .await;
    assert_eq!(
        response.message(),
        "Shards are restarting. 1 of 2 shards restarted."
    );
    let restarted = fetch_tasks(&h.storage, &TaskQuery::instance_scoped(&web_key(), [2])).await;
    assert_eq!(restarted[0].status, ScheduleStatus::Restarting);

    let response = h
        .api
        .restart_shards(web_key(), BTreeSet::from([0]), None, &mallory())
        .await;
    assert_eq!(response.response_code, ResponseCode::AuthFailed);
}

#[tokio::test]
async fn test_kill_tasks() {
    let h = harness();
    let job = JobConfigurationBuilder::new(ROLE, "prod", "web")
        .with_instances(3)
        .build();
    assert!(h.api.create_job(job, None, &alice()).await.is_ok());

    let mut blank = TaskQuery::role_scoped(ROLE);
    blank.job_name = Some("  ".to_string());
    let response = h.api.kill_tasks(blank, None, &alice()).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);
    assert_eq!(response.message(), "Invalid job name: '  '");

    let query = TaskQuery::job_scoped(&web_key());
    let response = h.api.kill_tasks(query.clone(), None, &mallory()).await;
    assert_eq!(response.response_code, ResponseCode::AuthFailed);

    let response = h.api.kill_tasks(query.clone(), None, &alice()).await;
    assert_eq!(response.message(), "Killed 3 tasks.");

    let tasks = fetch_tasks(&h.storage, &query).await;
    assert!(tasks.iter().all(|t| t.status == ScheduleStatus::Killed));
    let last = tasks[0].task_events.last().unwrap();
    assert_eq!(last.message.as_deref(), Some("Killed by alice"));
}

#[tokio::test]
async fn test_force_task_state_requires_root() {
    let h = harness();
    let job = JobConfigurationBuilder::new(ROLE, "prod", "web").build();
    assert!(h.api.create_job(job, None, &alice()).await.is_ok());
    let task_id = fetch_tasks(&h.storage, &TaskQuery::unscoped()).await[0]
        .task_id()
        .to_string();

    let response = h
        .api
        .force_task_state(task_id.clone(), ScheduleStatus::Running, &alice())
        .await;
    assert_eq!(response.response_code, ResponseCode::AuthFailed);

    let response = h
        .api
        .force_task_state(task_id.clone(), ScheduleStatus::Running, &root())
        .await;
    assert_eq!(response.message(), "Transition attempted.");

    let task = fetch_tasks(&h.storage, &TaskQuery::task_scoped([task_id])).await;
    assert_eq!(task[0].status, ScheduleStatus::Running);
    assert_eq!(
        task[0].task_events.last().unwrap().message.as_deref(),
        Some("Transition forced by ops")
    );
}

#[tokio::test]
async fn test_populate_job_config_is_read_only() {
    let h = harness();
    let job = JobConfigurationBuilder::new(ROLE, "prod", "web")
        .with_instances(3)
        .build();

    let response = h.api.populate_job_config(job).await;
    assert_eq!(response.message(), "Tasks populated");
    match &response.result {
        Some(ResponseResult::PopulateJob(configs)) => {
            assert_eq!(configs.len(), 1);
            assert_eq!(configs[0].priority, Some(0));
            assert_eq!(configs[0].production, Some(false));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(fetch_tasks(&h.storage, &TaskQuery::unscoped()).await.is_empty());

    let invalid = JobConfigurationBuilder::new(ROLE, "prod", "web")
        .with_task(TaskConfigBuilder::new(ROLE, "prod", "web").without_executor().build())
        .build();
    let response = h.api.populate_job_config(invalid).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);
    assert!(response.message().starts_with("Invalid configuration: "));
}
