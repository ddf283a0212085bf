//! Snapshot persistence for the territory store.
//!
//! The whole store is small (a few hundred rows), so every commit rewrites a
//! single JSON document through a temp file and an atomic rename.

use crate::core::{HistoryEntry, HistoryId, Result, Territory, TerritoryError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const SNAPSHOT_VERSION: u32 = 1;
pub const SNAPSHOT_FILE_NAME: &str = "territories.json";

// ============================================================================
// Store Snapshot
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub territories: Vec<Territory>,
    pub history: Vec<HistoryEntry>,
    pub next_history_id: HistoryId,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    pub territory_count: usize,
    pub history_count: usize,
}

impl StoreSnapshot {
    pub fn new(
        territories: Vec<Territory>,
        history: Vec<HistoryEntry>,
        next_history_id: HistoryId,
    ) -> Self {
        let metadata = SnapshotMetadata {
            created_at: Utc::now(),
            territory_count: territories.len(),
            history_count: history.len(),
        };

        Self {
            version: SNAPSHOT_VERSION,
            territories,
            history,
            next_history_id,
            metadata,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let snapshot: Self = serde_json::from_slice(bytes)
            .map_err(|e| TerritoryError::storage(format!("Failed to decode snapshot: {}", e)))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(TerritoryError::storage(format!(
                "Unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        Ok(snapshot)
    }
}

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// Rewrite the snapshot file on every commit.
    #[default]
    Snapshot,
    /// Keep everything in memory (tests, dry runs).
    None,
}

// ============================================================================
// Snapshot Manager
// ============================================================================

#[derive(Debug, Clone)]
pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    pub fn in_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        Self::new(data_dir.as_ref().join(SNAPSHOT_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.snapshot_path
    }

    pub async fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        atomic_write(&self.snapshot_path, &snapshot.to_bytes()?).await
    }

    /// Returns `None` when no snapshot has been written yet.
    pub async fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !fs::try_exists(&self.snapshot_path).await.unwrap_or(false) {
            return Ok(None);
        }
        read_snapshot(&self.snapshot_path).await.map(Some)
    }
}

pub async fn read_snapshot(path: &Path) -> Result<StoreSnapshot> {
    let bytes = fs::read(path).await.map_err(|err| {
        TerritoryError::storage(format!(
            "Failed to read snapshot '{}': {}",
            path.display(),
            err
        ))
    })?;
    StoreSnapshot::from_bytes(&bytes)
}

pub(crate) async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|err| {
            TerritoryError::storage(format!(
                "Failed to create parent directory '{}': {}",
                parent.display(),
                err
            ))
        })?;
    }

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).await.map_err(|err| {
        TerritoryError::storage(format!(
            "Failed to write temp file '{}': {}",
            tmp.display(),
            err
        ))
    })?;

    fs::rename(&tmp, path).await.map_err(|err| {
        TerritoryError::storage(format!(
            "Failed to rename temp file '{}' -> '{}': {}",
            tmp.display(),
            path.display(),
            err
        ))
    })?;

    Ok(())
}
