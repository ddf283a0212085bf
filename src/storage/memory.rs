use crate::core::{
    HistoryEntry, HistoryId, NewHistoryEntry, Result, Territory, TerritoryError, TerritoryId,
};
use crate::storage::persistence::StoreSnapshot;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};

/// The two relational tables of the store, kept in memory.
///
/// `history` is insertion ordered: ids grow monotonically, so the front of the
/// vector holds the oldest rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryTables {
    territories: BTreeMap<TerritoryId, Territory>,
    history: Vec<HistoryEntry>,
    next_history_id: HistoryId,
}

impl InMemoryTables {
    pub fn new() -> Self {
        Self {
            territories: BTreeMap::new(),
            history: Vec::new(),
            next_history_id: 1,
        }
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self> {
        let mut territories = BTreeMap::new();
        for territory in snapshot.territories {
            if !territory.is_consistent() {
                return Err(TerritoryError::storage(format!(
                    "Snapshot row for territory {} is inconsistent",
                    territory.id
                )));
            }
            let id = territory.id;
            if territories.insert(id, territory).is_some() {
                return Err(TerritoryError::storage(format!(
                    "Snapshot contains territory {} twice",
                    id
                )));
            }
        }

        let mut seen = HashSet::new();
        let mut history = snapshot.history;
        history.sort_by_key(|entry| entry.id);
        for entry in &history {
            if !seen.insert(entry.id) {
                return Err(TerritoryError::storage(format!(
                    "Snapshot contains history row {} twice",
                    entry.id
                )));
            }
            if !territories.contains_key(&entry.territory_id) {
                return Err(TerritoryError::storage(format!(
                    "History row {} references unknown territory {}",
                    entry.id, entry.territory_id
                )));
            }
        }

        let max_id = history.last().map(|entry| entry.id).unwrap_or(0);
        Ok(Self {
            territories,
            history,
            next_history_id: snapshot.next_history_id.max(max_id + 1),
        })
    }

    pub fn to_snapshot(&self) -> StoreSnapshot {
        StoreSnapshot::new(
            self.territories.values().cloned().collect(),
            self.history.clone(),
            self.next_history_id,
        )
    }

    // ------------------------------------------------------------------
    // territories
    // ------------------------------------------------------------------

    pub fn territory(&self, id: TerritoryId) -> Result<&Territory> {
        self.territories.get(&id).ok_or(TerritoryError::NotFound(id))
    }

    pub fn contains(&self, id: TerritoryId) -> bool {
        self.territories.contains_key(&id)
    }

    pub fn territories(&self) -> impl Iterator<Item = &Territory> {
        self.territories.values()
    }

    pub fn territory_count(&self) -> usize {
        self.territories.len()
    }

    pub fn update_territory<F>(&mut self, id: TerritoryId, apply: F) -> Result<Territory>
    where
        F: FnOnce(&mut Territory),
    {
        let mut territory = self.territory(id)?.clone();
        apply(&mut territory);

        if territory.id != id {
            return Err(TerritoryError::invalid("territory id cannot be changed"));
        }
        if !territory.is_consistent() {
            return Err(TerritoryError::invalid(format!(
                "update leaves territory {} with inconsistent status fields",
                id
            )));
        }
        self.territories.insert(id, territory.clone());
        Ok(territory)
    }

    pub fn insert_territory(&mut self, territory: Territory) -> Result<()> {
        if self.territories.contains_key(&territory.id) {
            return Err(TerritoryError::conflict(format!(
                "territory {} already exists",
                territory.id
            )));
        }
        if !territory.is_consistent() {
            return Err(TerritoryError::invalid(format!(
                "territory {} has inconsistent status fields",
                territory.id
            )));
        }
        self.territories.insert(territory.id, territory);
        Ok(())
    }

    // ------------------------------------------------------------------
    // history
    // ------------------------------------------------------------------

    pub fn append_history(&mut self, entry: NewHistoryEntry) -> Result<HistoryEntry> {
        if !self.territories.contains_key(&entry.territory_id) {
            return Err(TerritoryError::NotFound(entry.territory_id));
        }

        let row = HistoryEntry {
            id: self.next_history_id,
            territory_id: entry.territory_id,
            assignee: entry.assignee,
            date_taken: entry.date_taken,
            date_returned: None,
        };
        self.next_history_id += 1;
        self.history.push(row.clone());
        Ok(row)
    }

    /// Drops the oldest rows of a territory until at most `keep` remain.
    pub fn prune_history(&mut self, territory_id: TerritoryId, keep: usize) -> usize {
        let total = self
            .history
            .iter()
            .filter(|entry| entry.territory_id == territory_id)
            .count();
        let mut excess = total.saturating_sub(keep);
        if excess == 0 {
            return 0;
        }

        let removed = excess;
        self.history.retain(|entry| {
            if excess > 0 && entry.territory_id == territory_id {
                excess -= 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// Backfills the return date on the most recent open row.
    pub fn close_open_history(
        &mut self,
        territory_id: TerritoryId,
        returned: NaiveDate,
    ) -> Option<HistoryEntry> {
        let entry = self
            .history
            .iter_mut()
            .rev()
            .find(|entry| entry.territory_id == territory_id && entry.is_open())?;
        entry.date_returned = Some(returned);
        Some(entry.clone())
    }

    /// Moves the taken date of the most recent open row.
    pub fn redate_open_history(
        &mut self,
        territory_id: TerritoryId,
        taken: NaiveDate,
    ) -> Option<HistoryEntry> {
        let entry = self
            .history
            .iter_mut()
            .rev()
            .find(|entry| entry.territory_id == territory_id && entry.is_open())?;
        entry.date_taken = taken;
        Some(entry.clone())
    }

    /// Newest first.
    pub fn list_history(&self, territory_id: TerritoryId, limit: usize) -> Vec<HistoryEntry> {
        self.history
            .iter()
            .rev()
            .filter(|entry| entry.territory_id == territory_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn clear_history(&mut self, territory_id: TerritoryId) -> usize {
        let before = self.history.len();
        self.history.retain(|entry| entry.territory_id != territory_id);
        before - self.history.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}
