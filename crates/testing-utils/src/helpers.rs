//! Storage seeding helpers
//!
//! Seeding goes through the regular write transaction of the storage so the
//! seeded state is visible to both consistent and weak reads.

use scheduler_core::SchedulerResult;
use scheduler_domain::storage::{self, MutableStoreProvider};
use scheduler_domain::{
    JobConfiguration, ResourceAggregate, SanitizedConfiguration, ScheduledTask, TaskQuery,
};
use scheduler_infrastructure::{MemStorage, CRON_MANAGER_ID};

pub async fn seed_tasks(storage: &MemStorage, tasks: Vec<ScheduledTask>) -> SchedulerResult<()> {
    storage::write(storage, |store: &mut dyn MutableStoreProvider| {
        store.task_store_mut().save_tasks(tasks);
        Ok(())
    })
    .await
}

/// Sanitizes the job and stores it as a cron template, returning the stored value
pub async fn seed_cron_template(
    storage: &MemStorage,
    job: JobConfiguration,
) -> SchedulerResult<JobConfiguration> {
    let template = SanitizedConfiguration::from_unsanitized(job)?.job_config;
    let stored = template.clone();
    storage::write(storage, |store: &mut dyn MutableStoreProvider| {
        store
            .job_store_mut()
            .save_accepted_job(CRON_MANAGER_ID, template);
        Ok(())
    })
    .await?;
    Ok(stored)
}

pub async fn seed_quota(
    storage: &MemStorage,
    role: &str,
    quota: ResourceAggregate,
) -> SchedulerResult<()> {
    storage::write(storage, |store: &mut dyn MutableStoreProvider| {
        store.quota_store_mut().save_quota(role, quota);
        Ok(())
    })
    .await
}

pub async fn fetch_tasks(storage: &MemStorage, query: &TaskQuery) -> Vec<ScheduledTask> {
    storage::consistent_read(storage, |store| Ok(store.task_store().fetch_tasks(query)))
        .await
        .unwrap_or_default()
}

pub async fn fetch_quota(storage: &MemStorage, role: &str) -> Option<ResourceAggregate> {
    storage::consistent_read(storage, |store| Ok(store.quota_store().fetch_quota(role)))
        .await
        .ok()
        .flatten()
}
