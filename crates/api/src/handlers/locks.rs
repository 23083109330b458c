use scheduler_core::EventKind;
use scheduler_domain::{Lock, LockKey, LockValidation};

use crate::auth::SessionKey;
use crate::coordinator::{single_role, SchedulerApi};
use crate::error::ApiResult;
use crate::policy::Operation;
use crate::response::{Response, ResponseResult};

impl SchedulerApi {
    pub async fn acquire_lock(&self, lock_key: LockKey, session: &SessionKey) -> Response {
        let result = self.try_acquire_lock(lock_key, session).await;
        self.respond(Operation::AcquireLock, result).await
    }

    async fn try_acquire_lock(&self, lock_key: LockKey, session: &SessionKey) -> ApiResult<Response> {
        let context = self.authorize(
            Operation::AcquireLock,
            session,
            &single_role(lock_key.role()),
        )?;
        let lock = self
            .state
            .lock_manager
            .acquire_lock(lock_key, &context.identity)
            .await?;

        self.track(EventKind::LockAcquired, Operation::AcquireLock, lock.to_string())
            .await;
        Ok(Response::ok_with_result(ResponseResult::Lock(lock))
            .with_message("Lock has been acquired."))
    }

    pub async fn release_lock(
        &self,
        lock: Lock,
        validation: LockValidation,
        session: &SessionKey,
    ) -> Response {
        let result = self.try_release_lock(lock, validation, session).await;
        self.respond(Operation::ReleaseLock, result).await
    }

    async fn try_release_lock(
        &self,
        lock: Lock,
        validation: LockValidation,
        session: &SessionKey,
    ) -> ApiResult<Response> {
        self.authorize(Operation::ReleaseLock, session, &single_role(lock.key.role()))?;

        let manager = &self.state.lock_manager;
        match validation {
            LockValidation::Checked => {
                manager.validate_if_locked(&lock.key, Some(&lock)).await?;
                manager.release_lock(&lock).await?;
            }
            LockValidation::Unchecked => manager.release_lock_unchecked(&lock.key).await?,
        }

        self.track(EventKind::LockReleased, Operation::ReleaseLock, lock.to_string())
            .await;
        Ok(Response::ok_with_message("Lock has been released."))
    }
}
