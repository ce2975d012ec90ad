pub mod event_repo;
pub mod job_repo;
pub mod schema;
pub mod snapshot_repo;
pub mod store;
pub mod util;

pub use crate::snapshot_repo::SnapshotRepo;
pub use crate::store::DbStore;
