use crate::core::{
    HistoryEntry, NewHistoryEntry, Result, Territory, TerritoryError, TerritoryId,
};
use crate::storage::memory::InMemoryTables;
use crate::storage::persistence::{DurabilityMode, SnapshotManager, StoreSnapshot};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::{debug, info};

/// Durable home of territories and their history.
///
/// Reads take a shared lock. Writes go through [`StoreTransaction`], which
/// holds the exclusive lock from `begin` until commit or drop, so lifecycle
/// operations on the store are serialized.
pub struct TerritoryStore {
    tables: RwLock<InMemoryTables>,
    snapshots: Option<SnapshotManager>,
}

impl TerritoryStore {
    pub fn in_memory() -> Self {
        Self {
            tables: RwLock::new(InMemoryTables::new()),
            snapshots: None,
        }
    }

    /// Opens (or creates) the store under `data_dir`.
    pub async fn open<P: AsRef<Path>>(data_dir: P, durability: DurabilityMode) -> Result<Self> {
        if durability == DurabilityMode::None {
            return Ok(Self::in_memory());
        }

        let manager = SnapshotManager::in_dir(data_dir);
        let tables = match manager.load().await? {
            Some(snapshot) => {
                let tables = InMemoryTables::from_snapshot(snapshot)?;
                info!(
                    path = %manager.path().display(),
                    territories = tables.territory_count(),
                    history = tables.history_len(),
                    "territory store loaded"
                );
                tables
            }
            None => {
                info!(path = %manager.path().display(), "territory store initialized empty");
                InMemoryTables::new()
            }
        };

        Ok(Self {
            tables: RwLock::new(tables),
            snapshots: Some(manager),
        })
    }

    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.snapshots
            .as_ref()
            .map(|manager| manager.path().to_path_buf())
    }

    pub async fn begin(&self) -> StoreTransaction<'_> {
        let guard = self.tables.write().await;
        let working = guard.clone();
        StoreTransaction {
            guard,
            working,
            snapshots: self.snapshots.as_ref(),
        }
    }

    pub async fn get_territory(&self, id: TerritoryId) -> Result<Territory> {
        self.tables.read().await.territory(id).cloned()
    }

    /// All territories ordered by id.
    pub async fn list_territories(&self) -> Vec<Territory> {
        self.tables.read().await.territories().cloned().collect()
    }

    /// Newest first, at most `limit` rows.
    pub async fn list_history(&self, id: TerritoryId, limit: usize) -> Result<Vec<HistoryEntry>> {
        let tables = self.tables.read().await;
        tables.territory(id)?;
        Ok(tables.list_history(id, limit))
    }

    /// Territory and its newest history rows, read under one lock.
    pub async fn get_with_history(
        &self,
        id: TerritoryId,
        limit: usize,
    ) -> Result<(Territory, Vec<HistoryEntry>)> {
        let tables = self.tables.read().await;
        let territory = tables.territory(id)?.clone();
        Ok((territory, tables.list_history(id, limit)))
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        self.tables.read().await.to_snapshot()
    }

    /// Creates territories `1..=count` that do not exist yet.
    pub async fn seed(&self, count: u32) -> Result<usize> {
        let mut tx = self.begin().await;
        let mut created = 0;
        for value in 1..=count {
            let id = TerritoryId::new(value)?;
            if !tx.contains(id) {
                tx.insert_territory(Territory::new(id))?;
                created += 1;
            }
        }
        if created > 0 {
            tx.commit().await?;
            info!(created, count, "territories seeded");
        }
        Ok(created)
    }
}

/// Working copy of the tables plus the exclusive lock on the store.
///
/// Dropping the transaction without [`commit`](Self::commit) discards every
/// change.
pub struct StoreTransaction<'a> {
    guard: RwLockWriteGuard<'a, InMemoryTables>,
    working: InMemoryTables,
    snapshots: Option<&'a SnapshotManager>,
}

impl StoreTransaction<'_> {
    pub fn get_territory(&self, id: TerritoryId) -> Result<&Territory> {
        self.working.territory(id)
    }

    pub fn contains(&self, id: TerritoryId) -> bool {
        self.working.contains(id)
    }

    pub fn update_territory<F>(&mut self, id: TerritoryId, apply: F) -> Result<Territory>
    where
        F: FnOnce(&mut Territory),
    {
        self.working.update_territory(id, apply)
    }

    pub fn insert_territory(&mut self, territory: Territory) -> Result<()> {
        self.working.insert_territory(territory)
    }

    pub fn append_history(&mut self, entry: NewHistoryEntry) -> Result<HistoryEntry> {
        self.working.append_history(entry)
    }

    pub fn prune_history(&mut self, id: TerritoryId, keep: usize) -> usize {
        self.working.prune_history(id, keep)
    }

    pub fn close_open_history(
        &mut self,
        id: TerritoryId,
        returned: NaiveDate,
    ) -> Option<HistoryEntry> {
        self.working.close_open_history(id, returned)
    }

    pub fn redate_open_history(
        &mut self,
        id: TerritoryId,
        taken: NaiveDate,
    ) -> Option<HistoryEntry> {
        self.working.redate_open_history(id, taken)
    }

    pub fn list_history(&self, id: TerritoryId, limit: usize) -> Vec<HistoryEntry> {
        self.working.list_history(id, limit)
    }

    pub fn clear_history(&mut self, id: TerritoryId) -> usize {
        self.working.clear_history(id)
    }

    /// Replaces the whole content of the store (restore from backup).
    pub fn replace_all(&mut self, snapshot: StoreSnapshot) -> Result<()> {
        self.working = InMemoryTables::from_snapshot(snapshot)?;
        Ok(())
    }

    /// Persists the working copy and publishes it. On failure nothing
    /// becomes visible.
    pub async fn commit(self) -> Result<()> {
        let Self {
            mut guard,
            working,
            snapshots,
        } = self;

        if *guard == working {
            return Ok(());
        }

        if let Some(manager) = snapshots {
            manager.save(&working.to_snapshot()).await.map_err(|err| {
                TerritoryError::storage(format!("commit aborted: {}", err))
            })?;
            debug!(path = %manager.path().display(), "snapshot written");
        }

        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TerritoryStatus;

    fn id(value: u32) -> TerritoryId {
        TerritoryId::new(value).unwrap()
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = TerritoryStore::in_memory();
        store.seed(3).await.unwrap();

        {
            let mut tx = store.begin().await;
            tx.update_territory(id(2), |t| t.notes = "draft".to_string())
                .unwrap();
        }

        assert_eq!(store.get_territory(id(2)).await.unwrap().notes, "");
    }

    #[tokio::test]
    async fn committed_changes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = TerritoryStore::open(dir.path(), DurabilityMode::Snapshot)
                .await
                .unwrap();
            assert_eq!(store.seed(4).await.unwrap(), 4);
            let mut tx = store.begin().await;
            tx.update_territory(id(4), |t| t.custom_name = "Riverside".to_string())
                .unwrap();
            tx.commit().await.unwrap();
        }

        let reopened = TerritoryStore::open(dir.path(), DurabilityMode::Snapshot)
            .await
            .unwrap();
        let territories = reopened.list_territories().await;
        assert_eq!(territories.len(), 4);
        assert_eq!(territories[3].custom_name, "Riverside");
        assert_eq!(territories[3].status, TerritoryStatus::Free);
        assert_eq!(reopened.seed(4).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_snapshot_write_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let store = TerritoryStore::open(&data_dir, DurabilityMode::Snapshot)
            .await
            .unwrap();
        store.seed(2).await.unwrap();

        std::fs::remove_dir_all(&data_dir).unwrap();
        std::fs::write(&data_dir, b"not a directory").unwrap();

        let mut tx = store.begin().await;
        tx.update_territory(id(1), |t| t.notes = "lost".to_string())
            .unwrap();
        let err = tx.commit().await.unwrap_err();

        assert!(matches!(err, TerritoryError::Storage(_)));
        assert_eq!(store.get_territory(id(1)).await.unwrap().notes, "");
    }

    #[tokio::test]
    async fn history_listing_requires_known_territory() {
        let store = TerritoryStore::in_memory();
        store.seed(1).await.unwrap();
        assert!(store.list_history(id(1), 5).await.unwrap().is_empty());
        assert_eq!(
            store.list_history(id(2), 5).await.unwrap_err(),
            TerritoryError::NotFound(id(2))
        );
    }
}
