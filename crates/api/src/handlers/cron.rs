use scheduler_core::SchedulerError;
use scheduler_domain::{JobConfiguration, JobKey, Lock, LockKey, SanitizedConfiguration};
use tracing::info;

use crate::auth::SessionKey;
use crate::coordinator::{assert_valid_key, single_role, SchedulerApi};
use crate::error::{ApiError, ApiResult};
use crate::policy::Operation;
use crate::response::Response;

impl SchedulerApi {
    /// 创建或更新cron模板
    pub async fn schedule_cron_job(
        &self,
        job: JobConfiguration,
        lock: Option<Lock>,
        session: &SessionKey,
    ) -> Response {
        let result = self.try_schedule_cron_job(job, lock, session).await;
        self.respond(Operation::ScheduleCronJob, result).await
    }

    async fn try_schedule_cron_job(
        &self,
        job: JobConfiguration,
        lock: Option<Lock>,
        session: &SessionKey,
    ) -> ApiResult<Response> {
        self.authorize(Operation::ScheduleCronJob, session, &single_role(&job.owner.role))?;

        let sanitized = SanitizedConfiguration::from_unsanitized(job)?;
        let key = sanitized.job_config.key.clone();
        self.state
            .lock_manager
            .validate_if_locked(&LockKey::job(key.clone()), lock.as_ref())
            .await?;

        if !sanitized.is_cron_job() {
            return Err(SchedulerError::schedule(format!("Job {key} has no cron schedule")).into());
        }
        let schedule = sanitized.job_config.cron_schedule.clone().unwrap_or_default();
        let warnings = sanitized.warnings.clone();

        let cron = &self.state.cron_job_manager;
        if cron.has_job(&key).await? {
            cron.update_job(sanitized).await?;
        } else {
            cron.create_job(sanitized).await?;
        }

        info!("作业 {} 已按 '{}' 调度", key, schedule);
        Ok(Response::ok_with_message(format!(
            "Job {key} scheduled with cron schedule '{schedule}'"
        ))
        .with_warnings(warnings))
    }

    pub async fn deschedule_cron_job(
        &self,
        key: JobKey,
        lock: Option<Lock>,
        session: &SessionKey,
    ) -> Response {
        let result = self.try_deschedule_cron_job(key, lock, session).await;
        self.respond(Operation::DescheduleCronJob, result).await
    }

    async fn try_deschedule_cron_job(
        &self,
        key: JobKey,
        lock: Option<Lock>,
        session: &SessionKey,
    ) -> ApiResult<Response> {
        self.authorize(Operation::DescheduleCronJob, session, &single_role(&key.role))?;
        self.state
            .lock_manager
            .validate_if_locked(&LockKey::job(key.clone()), lock.as_ref())
            .await?;

        if !self.state.cron_job_manager.delete_job(&key).await? {
            return Err(ApiError::invalid_request(format!(
                "Job {key} is not scheduled with cron"
            )));
        }
        Ok(Response::ok_with_message(format!(
            "Job {key} removed from cron schedule"
        )))
    }

    pub async fn replace_cron_template(
        &self,
        job: JobConfiguration,
        lock: Option<Lock>,
        session: &SessionKey,
    ) -> Response {
        let result = self.try_replace_cron_template(job, lock, session).await;
        self.respond(Operation::ReplaceCronTemplate, result).await
    }

    async fn try_replace_cron_template(
        &self,
        job: JobConfiguration,
        lock: Option<Lock>,
        session: &SessionKey,
    ) -> ApiResult<Response> {
        self.authorize(
            Operation::ReplaceCronTemplate,
            session,
            &single_role(&job.owner.role),
        )?;
        self.state
            .lock_manager
            .validate_if_locked(&LockKey::job(job.key.clone()), lock.as_ref())
            .await?;

        let sanitized = SanitizedConfiguration::from_unsanitized(job)?;
        let key = sanitized.job_config.key.clone();
        self.state.cron_job_manager.update_job(sanitized).await?;
        Ok(Response::ok_with_message(format!(
            "Replaced template for: {key}"
        )))
    }

    /// 立即触发一次cron运行
    pub async fn start_cron_job(&self, key: JobKey, session: &SessionKey) -> Response {
        let result = self.try_start_cron_job(key, session).await;
        self.respond(Operation::StartCronJob, result).await
    }

    async fn try_start_cron_job(&self, key: JobKey, session: &SessionKey) -> ApiResult<Response> {
        self.authorize(Operation::StartCronJob, session, &single_role(&key.role))?;
        assert_valid_key(&key)?;

        self.state
            .cron_job_manager
            .start_job_now(&key)
            .await
            .map_err(|e| ApiError::from(e).prefixed("Failed to start cron job - "))?;
        Ok(Response::ok_with_message("Cron run started."))
    }
}
