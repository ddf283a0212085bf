//! File-based backups of the territory store.
//!
//! A backup is a copy of the store snapshot named after the moment it was
//! taken (`backup_YYYYMMDD_HHMMSS.json`). Only the newest `retain` files are
//! kept.

use crate::core::{Result, TerritoryError};
use crate::storage::persistence::{atomic_write, read_snapshot};
use crate::storage::store::TerritoryStore;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const BACKUP_PREFIX: &str = "backup_";
pub const BACKUP_EXTENSION: &str = "json";
pub const DEFAULT_RETAIN: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

pub struct BackupManager {
    store: Arc<TerritoryStore>,
    backup_dir: PathBuf,
    retain: usize,
}

impl BackupManager {
    pub fn new<P: AsRef<Path>>(store: Arc<TerritoryStore>, backup_dir: P, retain: usize) -> Self {
        Self {
            store,
            backup_dir: backup_dir.as_ref().to_path_buf(),
            retain: retain.max(1),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Writes a new backup and prunes old ones.
    pub async fn create_backup(&self) -> Result<PathBuf> {
        let snapshot = self.store.snapshot().await;
        let path = self.next_backup_path().await?;
        atomic_write(&path, &snapshot.to_bytes()?).await?;
        info!(
            path = %path.display(),
            territories = snapshot.metadata.territory_count,
            history = snapshot.metadata.history_count,
            "backup created"
        );

        if let Err(err) = self.prune().await {
            warn!(error = %err, "backup cleanup failed");
        }
        Ok(path)
    }

    /// Oldest first.
    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        if !fs::try_exists(&self.backup_dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&self.backup_dir).await?;
        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_backup_name(&name) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            backups.push(BackupInfo {
                name,
                path: entry.path(),
                size_bytes: metadata.len(),
            });
        }

        backups.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(backups)
    }

    /// Deletes everything but the newest `retain` backups.
    pub async fn prune(&self) -> Result<usize> {
        let backups = self.list_backups().await?;
        if backups.len() <= self.retain {
            return Ok(0);
        }

        let excess = backups.len() - self.retain;
        for backup in &backups[..excess] {
            fs::remove_file(&backup.path).await?;
            info!(name = %backup.name, "old backup deleted");
        }
        Ok(excess)
    }

    /// Restores the newest backup. Returns `None` when there is none.
    pub async fn restore_latest(&self) -> Result<Option<PathBuf>> {
        let Some(latest) = self.list_backups().await?.pop() else {
            return Ok(None);
        };
        self.restore_from(&latest.path).await?;
        Ok(Some(latest.path))
    }

    pub async fn restore_named(&self, name: &str) -> Result<PathBuf> {
        if !is_backup_name(name) || name.contains(['/', '\\']) {
            return Err(TerritoryError::invalid(format!(
                "'{}' is not a backup file name",
                name
            )));
        }
        let path = self.backup_dir.join(name);
        self.restore_from(&path).await?;
        Ok(path)
    }

    async fn restore_from(&self, path: &Path) -> Result<()> {
        let snapshot = read_snapshot(path).await?;
        let territories = snapshot.territories.len();

        let mut tx = self.store.begin().await;
        tx.replace_all(snapshot)?;
        tx.commit().await?;

        info!(path = %path.display(), territories, "store restored from backup");
        Ok(())
    }

    /// Backups taken within the same second get a growing `_NNN` suffix so
    /// names keep sorting chronologically even after pruning.
    async fn next_backup_path(&self) -> Result<PathBuf> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let base = format!("{BACKUP_PREFIX}{stamp}");

        let latest_suffix = self
            .list_backups()
            .await?
            .iter()
            .filter_map(|backup| same_second_suffix(&backup.name, &base))
            .max();

        let name = match latest_suffix {
            None => format!("{base}.{BACKUP_EXTENSION}"),
            Some(suffix) => format!("{base}_{:03}.{BACKUP_EXTENSION}", suffix + 1),
        };
        Ok(self.backup_dir.join(name))
    }
}

/// `Some(0)` for `<base>.json`, `Some(n)` for `<base>_NNN.json`.
fn same_second_suffix(name: &str, base: &str) -> Option<u32> {
    let rest = name
        .strip_prefix(base)?
        .strip_suffix(&format!(".{BACKUP_EXTENSION}"))?;
    if rest.is_empty() {
        return Some(0);
    }
    rest.strip_prefix('_')?.parse().ok()
}

fn is_backup_name(name: &str) -> bool {
    name.starts_with(BACKUP_PREFIX) && name.ends_with(&format!(".{BACKUP_EXTENSION}"))
}

/// Runs `create_backup` every `period` until the handle is aborted.
/// Failures are logged and the job keeps going.
pub fn spawn_backup_job(manager: Arc<BackupManager>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        info!(period_secs = period.as_secs(), "backup scheduler started");

        loop {
            ticker.tick().await;
            if let Err(err) = manager.create_backup().await {
                error!(error = %err, "scheduled backup failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TerritoryId;
    use crate::storage::persistence::DurabilityMode;

    async fn store_in(dir: &Path) -> Arc<TerritoryStore> {
        let store = TerritoryStore::open(dir.join("data"), DurabilityMode::Snapshot)
            .await
            .unwrap();
        store.seed(3).await.unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn backups_rotate_to_retain_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let manager = BackupManager::new(store, dir.path().join("backups"), 3);

        let mut created = Vec::new();
        for _ in 0..5 {
            created.push(manager.create_backup().await.unwrap());
        }

        let remaining = manager.list_backups().await.unwrap();
        assert_eq!(remaining.len(), 3);
        let remaining_paths: Vec<_> = remaining.into_iter().map(|b| b.path).collect();
        assert_eq!(remaining_paths, created[2..].to_vec());
    }

    #[tokio::test]
    async fn restore_latest_brings_back_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let manager = BackupManager::new(store.clone(), dir.path().join("backups"), 7);
        let id = TerritoryId::new(2).unwrap();

        manager.create_backup().await.unwrap();

        let mut tx = store.begin().await;
        tx.update_territory(id, |t| t.notes = "after backup".to_string())
            .unwrap();
        tx.commit().await.unwrap();

        let restored = manager.restore_latest().await.unwrap();
        assert!(restored.is_some());
        assert_eq!(store.get_territory(id).await.unwrap().notes, "");
    }

    #[tokio::test]
    async fn restore_without_backups_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let manager = BackupManager::new(store, dir.path().join("missing"), 7);
        assert_eq!(manager.restore_latest().await.unwrap(), None);
    }

    #[test]
    fn same_second_suffix_parses_numbered_names() {
        let base = "backup_20250101_030000";
        assert_eq!(same_second_suffix("backup_20250101_030000.json", base), Some(0));
        assert_eq!(same_second_suffix("backup_20250101_030000_012.json", base), Some(12));
        assert_eq!(same_second_suffix("backup_20250101_030001.json", base), None);
        assert_eq!(same_second_suffix("backup_20250101_030000.tmp", base), None);
    }

    #[tokio::test]
    async fn restore_named_rejects_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let manager = BackupManager::new(store, dir.path().join("backups"), 7);
        let err = manager
            .restore_named("../data/backup_x.json")
            .await
            .unwrap_err();
        assert!(matches!(err, TerritoryError::InvalidArgument(_)));
    }
}
