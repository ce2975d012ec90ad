pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod exec;
pub mod forge;
pub mod generation;
pub mod jobs;
pub mod messages;
pub mod quality;
pub mod reconciler;
pub mod session;
pub mod store;
pub mod validation;
pub mod vfs;

pub mod types;

pub use crate::config::{ForgeConfig, Locale, ModePolicy};
pub use crate::engine::BuildOutcome;
pub use crate::error::ForgeError;
pub use crate::forge::{Forge, RequestContext};
pub use crate::session::{CancelToken, Session};
pub use crate::store::Store;
pub use crate::vfs::{History, MemoryHistory, SnapshotPersistence, VersionedFileStore};
