//! 备份、恢复与快照，全部要求ROOT能力

use std::collections::BTreeSet;

use scheduler_domain::TaskQuery;
use tracing::info;

use crate::auth::SessionKey;
use crate::coordinator::SchedulerApi;
use crate::error::ApiResult;
use crate::policy::Operation;
use crate::response::{Response, ResponseResult};

impl SchedulerApi {
    pub async fn perform_backup(&self, session: &SessionKey) -> Response {
        let result = self.try_perform_backup(session).await;
        self.respond(Operation::PerformBackup, result).await
    }

    async fn try_perform_backup(&self, session: &SessionKey) -> ApiResult<Response> {
        self.authorize(Operation::PerformBackup, session, &BTreeSet::new())?;
        let backup_id = self.state.backup.backup_now().await?;
        info!("已创建备份 {}", backup_id);
        Ok(Response::ok_with_message(format!("Backup {backup_id} created.")))
    }

    pub async fn list_backups(&self, session: &SessionKey) -> Response {
        let result = self.try_list_backups(session).await;
        self.respond(Operation::ListBackups, result).await
    }

    async fn try_list_backups(&self, session: &SessionKey) -> ApiResult<Response> {
        self.authorize(Operation::ListBackups, session, &BTreeSet::new())?;
        let backups = self.state.recovery.list_backups().await?;
        Ok(Response::ok_with_result(ResponseResult::Backups(backups)))
    }

    pub async fn stage_recovery(&self, backup_id: String, session: &SessionKey) -> Response {
        let result = self.try_stage_recovery(&backup_id, session).await;
        self.respond(Operation::StageRecovery, result).await
    }

    async fn try_stage_recovery(&self, backup_id: &str, session: &SessionKey) -> ApiResult<Response> {
        self.authorize(Operation::StageRecovery, session, &BTreeSet::new())?;
        self.state.recovery.stage(backup_id).await?;
        Ok(Response::ok_with_message(format!("Backup {backup_id} staged.")))
    }

    pub async fn query_recovery(&self, query: TaskQuery, session: &SessionKey) -> Response {
        let result = self.try_query_recovery(&query, session).await;
        self.respond(Operation::QueryRecovery, result).await
    }

    async fn try_query_recovery(&self, query: &TaskQuery, session: &SessionKey) -> ApiResult<Response> {
        self.authorize(Operation::QueryRecovery, session, &BTreeSet::new())?;
        let tasks = self.state.recovery.query(query).await?;
        Ok(Response::ok_with_result(ResponseResult::QueryRecovery(tasks)))
    }

    pub async fn delete_recovery_tasks(&self, query: TaskQuery, session: &SessionKey) -> Response {
        let result = self.try_delete_recovery_tasks(&query, session).await;
        self.respond(Operation::DeleteRecoveryTasks, result).await
    }

    async fn try_delete_recovery_tasks(
        &self,
        query: &TaskQuery,
        session: &SessionKey,
    ) -> ApiResult<Response> {
        self.authorize(Operation::DeleteRecoveryTasks, session, &BTreeSet::new())?;
        self.state.recovery.delete_tasks(query).await?;
        Ok(Response::ok_with_message("Tasks deleted from staged recovery."))
    }

    pub async fn commit_recovery(&self, session: &SessionKey) -> Response {
        let result = self.try_commit_recovery(session).await;
        self.respond(Operation::CommitRecovery, result).await
    }

    async fn try_commit_recovery(&self, session: &SessionKey) -> ApiResult<Response> {
        let context = self.authorize(Operation::CommitRecovery, session, &BTreeSet::new())?;
        self.state.recovery.commit().await?;
        info!("{} 提交了恢复", context.identity);
        Ok(Response::ok_with_message("Recovery committed."))
    }

    pub async fn unload_recovery(&self, session: &SessionKey) -> Response {
        let result = self.try_unload_recovery(session).await;
        self.respond(Operation::UnloadRecovery, result).await
    }

    async fn try_unload_recovery(&self, session: &SessionKey) -> ApiResult<Response> {
        self.authorize(Operation::UnloadRecovery, session, &BTreeSet::new())?;
        self.state.recovery.unload().await?;
        Ok(Response::ok_with_message("Recovery unloaded."))
    }

    pub async fn snapshot(&self, session: &SessionKey) -> Response {
        let result = self.try_snapshot(session).await;
        self.respond(Operation::Snapshot, result).await
    }

    async fn try_snapshot(&self, session: &SessionKey) -> ApiResult<Response> {
        self.authorize(Operation::Snapshot, session, &BTreeSet::new())?;
        self.state.storage.snapshot().await?;
        Ok(Response::ok_with_message("Compaction successful."))
    }
}
