mod common;

use std::collections::BTreeSet;

use common::*;
use scheduler_api::{AddInstancesConfig, ResponseCode, ResponseResult};
use scheduler_domain::{JobKey, ScheduleStatus, TaskQuery};
use scheduler_testing_utils::{
    fetch_tasks, seed_cron_template, seed_tasks, JobConfigurationBuilder, ScheduledTaskBuilder,
    TaskConfigBuilder,
};

fn nightly_key() -> JobKey {
    JobKey::new(ROLE, "prod", "nightly")
}

#[tokio::test]
async fn test_empty_cron_schedule_is_not_a_cron_job() {
    let h = harness();
    let job = JobConfigurationBuilder::new(ROLE, "prod", "nightly")
        .with_cron("")
        .build();

    let response = h.api.schedule_cron_job(job, None, &alice()).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);
    assert!(response.message().contains("has no cron schedule"));
}

#[tokio::test]
async fn test_cron_lifecycle() {
    let h = harness();
    let job = JobConfigurationBuilder::new(ROLE, "prod", "nightly")
        .with_cron("*/5 * * * *")
        .with_instances(2)
        .build();

    let response = h.api.schedule_cron_job(job.clone(), None, &alice()).await;
    assert_eq!(
        response.message(),
        "Job www-data/prod/nightly scheduled with cron schedule '*/5 * * * *'"
    );
    // 再次调度走更新路径
    let response = h.api.schedule_cron_job(job, None, &alice()).await;
    assert!(response.is_ok(), "{response:?}");

    let replacement = JobConfigurationBuilder::new(ROLE, "prod", "nightly")
        .with_cron("0 3 * * *")
        .with_instances(4)
        .build();
    let response = h.api.replace_cron_template(replacement, None, &alice()).await;
    assert_eq!(response.message(), "Replaced template for: www-data/prod/nightly");

    let response = h.api.start_cron_job(nightly_key(), &alice()).await;
    assert_eq!(response.message(), "Cron run started.");
    let tasks = fetch_tasks(&h.storage, &TaskQuery::job_scoped(&nightly_key())).await;
    assert_eq!(tasks.len(), 4);

    // 已有活跃任务时拒绝再次触发
    let response = h.api.start_cron_job(nightly_key(), &alice()).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);
    assert!(response.message().starts_with("Failed to start cron job - "));

    let response = h.api.deschedule_cron_job(nightly_key(), None, &alice()).await;
    assert_eq!(response.message(), "Job www-data/prod/nightly removed from cron schedule");

    let response = h.api.deschedule_cron_job(nightly_key(), None, &alice()).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);
    assert_eq!(response.message(), "Job www-data/prod/nightly is not scheduled with cron");
}

#[tokio::test]
async fn test_cron_errors() {
    let h = harness();

    let response = h.api.start_cron_job(nightly_key(), &alice()).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);
    assert_eq!(
        response.message(),
        "Failed to start cron job - No such cron job: www-data/prod/nightly"
    );

    let malformed = JobConfigurationBuilder::new(ROLE, "prod", "nightly")
        .with_cron("not a schedule")
        .build();
    let response = h.api.schedule_cron_job(malformed, None, &alice()).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);

    let replacement = JobConfigurationBuilder::new(ROLE, "prod", "nightly")
        .with_cron("0 3 * * *")
        .build();
    let response = h.api.replace_cron_template(replacement, None, &alice()).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);

    let job = JobConfigurationBuilder::new(ROLE, "prod", "nightly")
        .with_cron("0 3 * * *")
        .build();
    let response = h.api.schedule_cron_job(job, None, &mallory()).await;
    assert_eq!(response.response_code, ResponseCode::AuthFailed);
    let response = h.api.deschedule_cron_job(nightly_key(), None, &mallory()).await;
    assert_eq!(response.response_code, ResponseCode::AuthFailed);
}

#[tokio::test]
async fn test_add_instances_rejects_cron_jobs() {
    let h = harness();
    let job = JobConfigurationBuilder::new(ROLE, "prod", "nightly")
        .with_cron("0 3 * * *")
        .build();
    assert!(h.api.schedule_cron_job(job, None, &alice()).await.is_ok());

    let config = AddInstancesConfig {
        key: nightly_key(),
        task_config: TaskConfigBuilder::for_job(&nightly_key()).build(),
        instance_ids: BTreeSet::from([0]),
    };
    let response = h.api.add_instances(config, None, &alice()).await;
    assert_eq!(response.response_code, ResponseCode::InvalidRequest);
    assert_eq!(response.message(), "Cron jobs are not supported here.");
}

#[tokio::test]
async fn test_job_summary_combines_tasks_and_cron_templates() {
    let h = harness();
    let web = JobConfigurationBuilder::new(ROLE, "prod", "web")
        .with_instances(2)
        .build();
    assert!(h.api.create_job(web, None, &alice()).await.is_ok());

    let finished = ScheduledTaskBuilder::new(TaskConfigBuilder::new(ROLE, "prod", "web").build(), 7)
        .with_status(ScheduleStatus::Finished)
        .build();
    let failed = ScheduledTaskBuilder::new(TaskConfigBuilder::new(ROLE, "prod", "web").build(), 8)
        .with_status(ScheduleStatus::Lost)
        .build();
    let other_role = ScheduledTaskBuilder::new(TaskConfigBuilder::new(OTHER_ROLE, "prod", "x").build(), 0)
        .running_on("host-a")
        .build();
    seed_tasks(&h.storage, vec![finished, failed, other_role]).await.unwrap();

    seed_cron_template(
        &h.storage,
        JobConfigurationBuilder::new(ROLE, "prod", "nightly")
            .with_cron("0 3 * * *")
            .build(),
    )
    .await
    .unwrap();

    let response = h.api.get_job_summary(Some(ROLE.to_string())).await;
    let summaries = match response.result {
        Some(ResponseResult::JobSummary(summaries)) => summaries,
        other => panic!("unexpected result: {other:?}"),
    };
    assert_eq!(summaries.len(), 2);

    let web = summaries.iter().find(|s| s.job.key.name == "web").unwrap();
    assert_eq!(web.job.instance_count, 4);
    assert_eq!(web.job.cron_schedule, None);
    assert_eq!(web.stats.pending_task_count, 2);
    assert_eq!(web.stats.finished_task_count, 1);
    assert_eq!(web.stats.failed_task_count, 1);
    assert_eq!(web.next_cron_run_ms, None);

    let nightly = summaries.iter().find(|s| s.job.key.name == "nightly").unwrap();
    assert_eq!(nightly.job.cron_schedule.as_deref(), Some("0 3 * * *"));
    assert!(nightly.next_cron_run_ms.is_some());

    let response = h.api.get_job_summary(None).await;
    match response.result {
        Some(ResponseResult::JobSummary(all)) => assert_eq!(all.len(), 3),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_role_summary_and_jobs() {
    let h = harness();
    let web = JobConfigurationBuilder::new(ROLE, "prod", "web").build();
    assert!(h.api.create_job(web, None, &alice()).await.is_ok());
    let batch = JobConfigurationBuilder::new(ROLE, "prod", "batch").build();
    assert!(h.api.create_job(batch, None, &alice()).await.is_ok());
    assert!(h
        .api
        .kill_tasks(TaskQuery::job_scoped(&JobKey::new(ROLE, "prod", "batch")), None, &alice())
        .await
        .is_ok());
    seed_cron_template(
        &h.storage,
        JobConfigurationBuilder::new(ROLE, "prod", "nightly")
            .with_cron("0 3 * * *")
            .build(),
    )
    .await
    .unwrap();

    let response = h.api.get_role_summary().await;
    match response.result {
        Some(ResponseResult::RoleSummary(roles)) => {
            assert_eq!(roles.len(), 1);
            assert_eq!(roles[0].role, ROLE);
            // job_count 只统计有任务的作业
            assert_eq!(roles[0].job_count, 2);
            assert_eq!(roles[0].cron_job_count, 1);
        }
        other => panic!("unexpected result: {other:?}"),
    }

    // 只统计有活跃任务的作业和cron模板
    let response = h.api.get_jobs(Some(ROLE.to_string())).await;
    match response.result {
        Some(ResponseResult::Jobs(jobs)) => {
            let names: Vec<&str> = jobs.iter().map(|j| j.key.name.as_str()).collect();
            assert_eq!(names, vec!["nightly", "web"]);
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let response = h.api.get_jobs(Some(OTHER_ROLE.to_string())).await;
    assert_eq!(response.result, Some(ResponseResult::Jobs(Vec::new())));
}

#[tokio::test]
async fn test_role_with_only_cron_templates_has_no_task_jobs() {
    let h = harness();
    seed_cron_template(
        &h.storage,
        JobConfigurationBuilder::new(ROLE, "prod", "nightly")
            .with_cron("0 3 * * *")
            .build(),
    )
    .await
    .unwrap();

    let response = h.api.get_role_summary().await;
    match response.result {
        Some(ResponseResult::RoleSummary(roles)) => {
            assert_eq!(roles.len(), 1);
            assert_eq!(roles[0].role, ROLE);
            assert_eq!(roles[0].job_count, 0);
            assert_eq!(roles[0].cron_job_count, 1);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_tasks_status_uses_query() {
    let h = harness();
    let web = JobConfigurationBuilder::new(ROLE, "prod", "web")
        .with_instances(3)
        .build();
    assert!(h.api.create_job(web, None, &alice()).await.is_ok());

    let query = TaskQuery::instance_scoped(&JobKey::new(ROLE, "prod", "web"), [0, 2]);
    let response = h.api.get_tasks_status(query).await;
    match response.result {
        Some(ResponseResult::ScheduleStatus(tasks)) => {
            let ids: BTreeSet<i32> = tasks.iter().map(|t| t.instance_id()).collect();
            assert_eq!(ids, BTreeSet::from([0, 2]));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
