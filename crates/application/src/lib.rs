pub mod lock_manager;
pub mod quota_manager;
pub mod state_manager;

pub use lock_manager::{validate_lock, LockManager, StorageLockManager};
pub use quota_manager::{
    check_production_admission, compute_quota_info, production_demand, QuotaManager,
    StorageQuotaManager,
};
pub use state_manager::{resolve_transition, StateManager};
