//! Test data builders for creating test entities
//!
//! Builders start from a configuration that passes sanitization, so tests only
//! spell out the fields they care about.

use chrono::Utc;
use scheduler_domain::{
    ExecutorConfig, Identity, JobConfiguration, JobKey, ScheduleStatus, ScheduledTask, TaskConfig,
};

/// Builder for creating test TaskConfig values
pub struct TaskConfigBuilder {
    config: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(role: &str, environment: &str, job_name: &str) -> Self {
        Self {
            config: TaskConfig {
                owner: Identity::new(role, "test-user"),
                environment: environment.to_string(),
                job_name: job_name.to_string(),
                is_service: None,
                num_cpus: 1.0,
                ram_mb: 128,
                disk_mb: 256,
                priority: None,
                max_task_failures: None,
                production: None,
                contact_email: None,
                requested_ports: Default::default(),
                executor_config: Some(ExecutorConfig {
                    name: "shell".to_string(),
                    data: "echo hello".to_string(),
                }),
            },
        }
    }

    pub fn for_job(key: &JobKey) -> Self {
        Self::new(&key.role, &key.environment, &key.name)
    }

    pub fn with_user(mut self, user: &str) -> Self {
        self.config.owner.user = user.to_string();
        self
    }

    pub fn with_resources(mut self, num_cpus: f64, ram_mb: i64, disk_mb: i64) -> Self {
        self.config.num_cpus = num_cpus;
        self.config.ram_mb = ram_mb;
        self.config.disk_mb = disk_mb;
        self
    }

    pub fn production(mut self) -> Self {
        self.config.production = Some(true);
        self
    }

    pub fn with_executor(mut self, name: &str, data: &str) -> Self {
        self.config.executor_config = Some(ExecutorConfig {
            name: name.to_string(),
            data: data.to_string(),
        });
        self
    }

    pub fn without_executor(mut self) -> Self {
        self.config.executor_config = None;
        self
    }

    pub fn build(self) -> TaskConfig {
        self.config
    }
}

/// Builder for creating test JobConfiguration values
pub struct JobConfigurationBuilder {
    job: JobConfiguration,
}

impl JobConfigurationBuilder {
    pub fn new(role: &str, environment: &str, name: &str) -> Self {
        let key = JobKey::new(role, environment, name);
        let task_config = TaskConfigBuilder::for_job(&key).build();
        Self {
            job: JobConfiguration {
                owner: task_config.owner.clone(),
                key,
                cron_schedule: None,
                task_config,
                instance_count: 1,
            },
        }
    }

    pub fn with_instances(mut self, instance_count: i32) -> Self {
        self.job.instance_count = instance_count;
        self
    }

    pub fn with_cron(mut self, schedule: &str) -> Self {
        self.job.cron_schedule = Some(schedule.to_string());
        self
    }

    pub fn with_user(mut self, user: &str) -> Self {
        self.job.owner.user = user.to_string();
        self.job.task_config.owner.user = user.to_string();
        self
    }

    pub fn with_task(mut self, task_config: TaskConfig) -> Self {
        self.job.task_config = task_config;
        self
    }

    /// Shortcut for `with_task` on a production template with the given resources
    pub fn production(mut self, num_cpus: f64, ram_mb: i64, disk_mb: i64) -> Self {
        self.job.task_config = TaskConfigBuilder::for_job(&self.job.key)
            .with_user(&self.job.owner.user)
            .with_resources(num_cpus, ram_mb, disk_mb)
            .production()
            .build();
        self
    }

    pub fn build(self) -> JobConfiguration {
        self.job
    }
}

/// Builder for creating test ScheduledTask entities
pub struct ScheduledTaskBuilder {
    task: ScheduledTask,
}

impl ScheduledTaskBuilder {
    pub fn new(config: TaskConfig, instance_id: i32) -> Self {
        Self {
            task: ScheduledTask::pending(config, instance_id, Utc::now().timestamp_millis()),
        }
    }

    pub fn with_status(mut self, status: ScheduleStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn running_on(mut self, host: &str) -> Self {
        self.task.status = ScheduleStatus::Running;
        self.task.assigned_task.slave_host = Some(host.to_string());
        self.task.assigned_task.slave_id = Some(format!("{host}-slave"));
        self
    }

    pub fn with_task_id(mut self, task_id: &str) -> Self {
        self.task.assigned_task.task_id = task_id.to_string();
        self
    }

    pub fn build(self) -> ScheduledTask {
        self.task
    }
}
