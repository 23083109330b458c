//! 只读视图，全部使用弱一致读

use std::collections::{BTreeMap, BTreeSet};

use scheduler_domain::{
    JobConfiguration, JobKey, JobStats, JobSummary, RoleSummary, ScheduleStatus, ScheduledTask,
    TaskQuery,
};

use crate::coordinator::SchedulerApi;
use crate::error::ApiResult;
use crate::policy::Operation;
use crate::response::{ApiVersion, Response, ResponseResult, CURRENT_API_VERSION};

/// 用作业最近的任务合成作业配置
///
/// 普通作业不单独保存配置，优先使用最近的活跃任务，没有活跃任务时使用最近的任务。
fn synthesize_job(key: &JobKey, tasks: &[ScheduledTask]) -> Option<JobConfiguration> {
    let latest = tasks
        .iter()
        .filter(|task| task.status.is_active())
        .max_by_key(|task| task.latest_event_ms())
        .or_else(|| tasks.iter().max_by_key(|task| task.latest_event_ms()))?;

    let task_config = latest.assigned_task.task.clone();
    Some(JobConfiguration {
        key: key.clone(),
        owner: task_config.owner.clone(),
        cron_schedule: None,
        task_config,
        instance_count: i32::try_from(tasks.len()).unwrap_or(i32::MAX),
    })
}

fn group_by_job(tasks: Vec<ScheduledTask>) -> BTreeMap<JobKey, Vec<ScheduledTask>> {
    let mut grouped: BTreeMap<JobKey, Vec<ScheduledTask>> = BTreeMap::new();
    for task in tasks {
        grouped.entry(task.job_key()).or_default().push(task);
    }
    grouped
}

fn job_stats(tasks: &[ScheduledTask]) -> JobStats {
    let mut stats = JobStats::default();
    for task in tasks {
        match task.status {
            ScheduleStatus::Pending => stats.pending_task_count += 1,
            ScheduleStatus::Failed | ScheduleStatus::Lost => stats.failed_task_count += 1,
            status if status.is_terminal() => stats.finished_task_count += 1,
            _ => stats.active_task_count += 1,
        }
    }
    stats
}

fn role_filter(role: Option<&str>) -> TaskQuery {
    match role {
        Some(role) => TaskQuery::role_scoped(role),
        None => TaskQuery::unscoped(),
    }
}

impl SchedulerApi {
    pub async fn get_tasks_status(&self, query: TaskQuery) -> Response {
        let result = self
            .state
            .storage
            .read_weak(&query)
            .await
            .map(|tasks| Response::ok_with_result(ResponseResult::ScheduleStatus(tasks)))
            .map_err(Into::into);
        self.respond(Operation::GetTasksStatus, result).await
    }

    pub async fn get_role_summary(&self) -> Response {
        let result = self.try_get_role_summary().await;
        self.respond(Operation::GetRoleSummary, result).await
    }

    async fn try_get_role_summary(&self) -> ApiResult<Response> {
        let tasks = self.state.storage.read_weak(&TaskQuery::unscoped()).await?;
        let cron_jobs = self.state.cron_job_manager.get_jobs().await?;

        let mut jobs_by_role: BTreeMap<String, BTreeSet<JobKey>> = BTreeMap::new();
        let mut cron_by_role: BTreeMap<String, usize> = BTreeMap::new();
        for task in &tasks {
            jobs_by_role
                .entry(task.role().to_string())
                .or_default()
                .insert(task.job_key());
        }
        // cron模板只计入 cron_job_count，角色本身仍然出现在结果中
        for job in &cron_jobs {
            jobs_by_role.entry(job.key.role.clone()).or_default();
            *cron_by_role.entry(job.key.role.clone()).or_default() += 1;
        }

        let summaries = jobs_by_role
            .into_iter()
            .map(|(role, jobs)| RoleSummary {
                cron_job_count: cron_by_role.get(&role).copied().unwrap_or(0),
                job_count: jobs.len(),
                role,
            })
            .collect();
        Ok(Response::ok_with_result(ResponseResult::RoleSummary(summaries)))
    }

    pub async fn get_job_summary(&self, role: Option<String>) -> Response {
        let result = self.try_get_job_summary(role.as_deref()).await;
        self.respond(Operation::GetJobSummary, result).await
    }

    async fn try_get_job_summary(&self, role: Option<&str>) -> ApiResult<Response> {
        let tasks = self.state.storage.read_weak(&role_filter(role)).await?;
        let grouped = group_by_job(tasks);

        let mut summaries: BTreeMap<JobKey, JobSummary> = BTreeMap::new();
        for (key, tasks) in &grouped {
            if let Some(job) = synthesize_job(key, tasks) {
                summaries.insert(
                    key.clone(),
                    JobSummary {
                        job,
                        stats: job_stats(tasks),
                        next_cron_run_ms: None,
                    },
                );
            }
        }

        // cron模板覆盖合成的配置
        for job in self.cron_jobs_for(role).await? {
            let stats = grouped
                .get(&job.key)
                .map(|tasks| job_stats(tasks))
                .unwrap_or_default();
            let next_cron_run_ms = job
                .cron_schedule
                .as_deref()
                .filter(|schedule| !schedule.is_empty())
                .and_then(|schedule| self.state.cron_predictor.predict_next_run(schedule));
            summaries.insert(
                job.key.clone(),
                JobSummary {
                    job,
                    stats,
                    next_cron_run_ms,
                },
            );
        }

        Ok(Response::ok_with_result(ResponseResult::JobSummary(
            summaries.into_values().collect(),
        )))
    }

    pub async fn get_jobs(&self, role: Option<String>) -> Response {
        let result = self.try_get_jobs(role.as_deref()).await;
        self.respond(Operation::GetJobs, result).await
    }

    async fn try_get_jobs(&self, role: Option<&str>) -> ApiResult<Response> {
        let tasks = self
            .state
            .storage
            .read_weak(&role_filter(role).active())
            .await?;

        let mut jobs: BTreeMap<JobKey, JobConfiguration> = group_by_job(tasks)
            .iter()
            .filter_map(|(key, tasks)| synthesize_job(key, tasks).map(|job| (key.clone(), job)))
            .collect();
        for job in self.cron_jobs_for(role).await? {
            jobs.insert(job.key.clone(), job);
        }

        Ok(Response::ok_with_result(ResponseResult::Jobs(
            jobs.into_values().collect(),
        )))
    }

    pub async fn get_version(&self) -> Response {
        let result = Ok(Response::ok_with_result(ResponseResult::Version(ApiVersion {
            major: CURRENT_API_VERSION,
        })));
        self.respond(Operation::GetVersion, result).await
    }

    async fn cron_jobs_for(&self, role: Option<&str>) -> ApiResult<Vec<JobConfiguration>> {
        let jobs = self.state.cron_job_manager.get_jobs().await?;
        Ok(jobs
            .into_iter()
            .filter(|job| role.map_or(true, |role| job.key.role == role))
            .collect())
    }
}
