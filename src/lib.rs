// ============================================================================
// Territory Tracker Library
// ============================================================================

pub mod auth;
pub mod config;
pub mod core;
pub mod import;
pub mod lifecycle;
pub mod mirror;
pub mod storage;
pub mod web;

// Re-export main types for convenience
pub use core::{HistoryEntry, Result, Territory, TerritoryError, TerritoryId, TerritoryStatus};
pub use lifecycle::{AssignRequest, Clock, LifecycleEngine, NotesPolicy, SystemClock};
pub use mirror::{MirrorError, MirrorSink, NoopMirror};
pub use storage::{BackupManager, DurabilityMode, TerritoryStore};
pub use web::{AppState, build_router};
