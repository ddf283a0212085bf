pub mod backup;
pub mod memory;
pub mod persistence;
pub mod store;

pub use backup::{BackupInfo, BackupManager, spawn_backup_job};
pub use memory::InMemoryTables;
pub use persistence::{DurabilityMode, SnapshotManager, StoreSnapshot};
pub use store::{StoreTransaction, TerritoryStore};

/// Maximum number of history rows kept per territory.
pub const HISTORY_RETENTION: usize = 5;
