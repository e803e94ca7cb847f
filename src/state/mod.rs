//! State storage: provisioned state records, locking, and backends.

mod local;
mod lock;
mod store;
mod types;

pub use local::LocalStateStore;
pub use lock::{generate_holder_id, LockInfo, LOCK_EXPIRY_SECS};
pub use store::StateStore;
pub use types::{
    DeploymentUnitState, ResourceRecord, RunHistoryEntry, RunStatus, STATE_VERSION,
};
