use crate::core::dates::{due_date, is_due_soon};
use crate::core::{
    HistoryEntry, NewHistoryEntry, Result, Territory, TerritoryError, TerritoryId,
    TerritoryStatus,
};
use crate::lifecycle::clock::Clock;
use crate::mirror::{MirrorEvent, MirrorSink, deliver};
use crate::storage::{HISTORY_RETENTION, TerritoryStore};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Input of [`LifecycleEngine::assign`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignRequest {
    pub assignee: String,
    pub taken_on: Option<NaiveDate>,
    pub due_on: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl AssignRequest {
    pub fn new(assignee: impl Into<String>) -> Self {
        Self {
            assignee: assignee.into(),
            ..Self::default()
        }
    }

    pub fn taken_on(mut self, date: NaiveDate) -> Self {
        self.taken_on = Some(date);
        self
    }

    pub fn due_on(mut self, date: NaiveDate) -> Self {
        self.due_on = Some(date);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// What happens to the notes when a territory's history is cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NotesPolicy {
    #[default]
    Preserve,
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TakenTerritory {
    #[serde(flatten)]
    pub territory: Territory,
    pub due_soon: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TerritoryOverview {
    pub taken: Vec<TakenTerritory>,
    pub free: Vec<Territory>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerritoryDetails {
    pub territory: Territory,
    pub history: Vec<HistoryEntry>,
    pub due_soon: bool,
}

/// The territory state machine.
///
/// Every transition runs in one store transaction. Mirror notifications are
/// sent after the commit and their failures are only logged.
pub struct LifecycleEngine {
    store: Arc<TerritoryStore>,
    mirror: Arc<dyn MirrorSink>,
    clock: Arc<dyn Clock>,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<TerritoryStore>,
        mirror: Arc<dyn MirrorSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            mirror,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<TerritoryStore> {
        &self.store
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Gives the territory to `request.assignee`, or edits the current
    /// assignment when the holder is unchanged.
    pub async fn assign(&self, id: TerritoryId, request: AssignRequest) -> Result<Territory> {
        let assignee = request.assignee.trim().to_string();
        if assignee.is_empty() {
            return Err(TerritoryError::invalid("assignee must not be empty"));
        }

        let today = self.clock.today();
        let mut events = Vec::new();
        let mut tx = self.store.begin().await;

        let current = tx.get_territory(id)?.clone();
        let holder_changed = !current.is_assigned() || current.assignee != assignee;

        let date_taken = match request.taken_on {
            Some(date) => date,
            None if holder_changed => today,
            None => current.date_taken.unwrap_or(today),
        };
        let date_due = match (request.due_on, current.date_due) {
            (Some(date), _) => date,
            (None, Some(existing)) if !holder_changed && request.taken_on.is_none() => existing,
            (None, _) => due_date(date_taken)?,
        };
        if date_due < date_taken {
            return Err(TerritoryError::invalid(format!(
                "due date {} is before taken date {}",
                date_due, date_taken
            )));
        }

        if holder_changed && current.is_assigned() {
            if let Some(previous) = current.date_taken.filter(|taken| date_taken < *taken) {
                return Err(TerritoryError::invalid(format!(
                    "handover date {} is before {} took territory {} on {}",
                    date_taken, current.assignee, id, previous
                )));
            }
            if tx.close_open_history(id, date_taken).is_none() {
                warn!(territory_id = %id, "handover without an open history entry");
            }
            events.push(MirrorEvent::Returned {
                territory_id: id,
                date_returned: date_taken,
            });
        }

        let updated = tx.update_territory(id, |territory| {
            territory.status = TerritoryStatus::Assigned;
            territory.assignee = assignee.clone();
            territory.date_taken = Some(date_taken);
            territory.date_due = Some(date_due);
            if let Some(notes) = request.notes {
                territory.notes = notes;
            }
        })?;

        if !holder_changed && current.date_taken != Some(date_taken) {
            tx.redate_open_history(id, date_taken);
        }

        if holder_changed {
            let entry = tx.append_history(NewHistoryEntry {
                territory_id: id,
                assignee: assignee.clone(),
                date_taken,
            })?;
            let evicted = tx.prune_history(id, HISTORY_RETENTION);
            debug!(territory_id = %id, history_id = entry.id, evicted, "history entry recorded");
            events.push(MirrorEvent::Assigned {
                territory_id: id,
                assignee,
                date_taken,
                date_due,
            });
        }

        tx.commit().await?;
        info!(
            territory_id = %id,
            assignee = %updated.assignee,
            date_due = %date_due,
            holder_changed,
            "territory assigned"
        );

        self.publish(events).await;
        Ok(updated)
    }

    /// Returns an assigned territory. Notes stay.
    pub async fn release(&self, id: TerritoryId) -> Result<Territory> {
        self.release_with_notes(id, None).await
    }

    /// Returns an assigned territory and, when given, replaces its notes in
    /// the same transaction.
    pub async fn release_with_notes(
        &self,
        id: TerritoryId,
        notes: Option<String>,
    ) -> Result<Territory> {
        let today = self.clock.today();
        let mut tx = self.store.begin().await;

        if !tx.get_territory(id)?.is_assigned() {
            return Err(TerritoryError::conflict(format!(
                "territory {} is already free",
                id
            )));
        }

        let closed = tx.close_open_history(id, today);
        let updated = tx.update_territory(id, |territory| {
            territory.mark_free();
            if let Some(notes) = notes {
                territory.notes = notes;
            }
        })?;
        tx.commit().await?;

        match closed {
            Some(entry) => info!(territory_id = %id, holder = %entry.assignee, "territory released"),
            None => warn!(territory_id = %id, "territory released without an open history entry"),
        }

        self.publish(vec![MirrorEvent::Returned {
            territory_id: id,
            date_returned: today,
        }])
        .await;
        Ok(updated)
    }

    /// Drops the whole history of a territory and frees it.
    pub async fn clear_history(&self, id: TerritoryId, policy: NotesPolicy) -> Result<Territory> {
        let mut tx = self.store.begin().await;
        tx.get_territory(id)?;

        let removed = tx.clear_history(id);
        let updated = tx.update_territory(id, |territory| {
            territory.mark_free();
            if policy == NotesPolicy::Clear {
                territory.notes.clear();
            }
        })?;
        tx.commit().await?;
        info!(territory_id = %id, removed, ?policy, "territory history cleared");

        self.publish(vec![MirrorEvent::Cleared { territory_id: id }])
            .await;
        Ok(updated)
    }

    pub async fn update_notes(&self, id: TerritoryId, notes: impl Into<String>) -> Result<Territory> {
        let notes = notes.into();
        let mut tx = self.store.begin().await;
        let updated = tx.update_territory(id, |territory| territory.notes = notes)?;
        tx.commit().await?;
        debug!(territory_id = %id, "territory notes updated");
        Ok(updated)
    }

    /// Taken territories with their due-soon flag, then free ones, by id.
    pub async fn overview(&self) -> TerritoryOverview {
        let today = self.clock.today();
        let mut overview = TerritoryOverview::default();

        for territory in self.store.list_territories().await {
            if territory.is_assigned() {
                overview.taken.push(TakenTerritory {
                    due_soon: due_soon(&territory, today),
                    territory,
                });
            } else {
                overview.free.push(territory);
            }
        }
        overview
    }

    pub async fn details(&self, id: TerritoryId) -> Result<TerritoryDetails> {
        let (territory, history) = self.store.get_with_history(id, HISTORY_RETENTION).await?;
        Ok(TerritoryDetails {
            due_soon: due_soon(&territory, self.clock.today()),
            territory,
            history,
        })
    }

    async fn publish(&self, events: Vec<MirrorEvent>) {
        for event in events {
            if let Err(err) = deliver(self.mirror.as_ref(), &event).await {
                warn!(
                    territory_id = %event.territory_id(),
                    kind = event.kind(),
                    error = %err,
                    "mirror update failed"
                );
            }
        }
    }
}

fn due_soon(territory: &Territory, today: NaiveDate) -> bool {
    territory.is_assigned() && territory.date_due.is_some_and(|due| is_due_soon(due, today))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dates::parse_date;
    use crate::lifecycle::FixedClock;
    use crate::mirror::MemoryMirror;

    struct Fixture {
        engine: LifecycleEngine,
        mirror: Arc<MemoryMirror>,
        clock: Arc<FixedClock>,
    }

    async fn fixture(today: &str) -> Fixture {
        let store = Arc::new(TerritoryStore::in_memory());
        store.seed(10).await.unwrap();
        let mirror = Arc::new(MemoryMirror::new());
        let clock = Arc::new(FixedClock::new(parse_date(today).unwrap()));
        Fixture {
            engine: LifecycleEngine::new(store, mirror.clone(), clock.clone()),
            mirror,
            clock,
        }
    }

    fn id(value: u32) -> TerritoryId {
        TerritoryId::new(value).unwrap()
    }

    fn date(raw: &str) -> NaiveDate {
        parse_date(raw).unwrap()
    }

    #[tokio::test]
    async fn assign_defaults_to_today() {
        let f = fixture("10.02.2025").await;
        let territory = f.engine.assign(id(1), AssignRequest::new(" Dana ")).await.unwrap();

        assert_eq!(territory.assignee, "Dana");
        assert_eq!(territory.date_taken, Some(date("10.02.2025")));
        assert_eq!(territory.date_due, Some(date("10.06.2025")));
    }

    #[tokio::test]
    async fn blank_assignee_is_rejected() {
        let f = fixture("10.02.2025").await;
        let err = f.engine.assign(id(1), AssignRequest::new("  ")).await.unwrap_err();
        assert!(matches!(err, TerritoryError::InvalidArgument(_)));
        assert!(!f.engine.store().get_territory(id(1)).await.unwrap().is_assigned());
    }

    #[tokio::test]
    async fn due_override_before_taken_date_is_rejected() {
        let f = fixture("10.02.2025").await;
        let request = AssignRequest::new("Dana")
            .taken_on(date("10.02.2025"))
            .due_on(date("01.02.2025"));
        let err = f.engine.assign(id(1), request).await.unwrap_err();
        assert!(matches!(err, TerritoryError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn same_holder_edit_keeps_history_and_skips_mirror() {
        let f = fixture("01.03.2025").await;
        f.engine.assign(id(2), AssignRequest::new("Eve")).await.unwrap();
        f.clock.set(date("05.03.2025"));

        let edited = f
            .engine
            .assign(id(2), AssignRequest::new("Eve").notes("north side"))
            .await
            .unwrap();

        assert_eq!(edited.date_taken, Some(date("01.03.2025")));
        assert_eq!(edited.notes, "north side");
        assert_eq!(f.engine.details(id(2)).await.unwrap().history.len(), 1);
        assert_eq!(f.mirror.events().await.len(), 1);
    }

    #[tokio::test]
    async fn handover_closes_previous_entry() {
        let f = fixture("01.03.2025").await;
        f.engine.assign(id(3), AssignRequest::new("Eve")).await.unwrap();
        f.clock.set(date("20.03.2025"));
        f.engine.assign(id(3), AssignRequest::new("Finn")).await.unwrap();

        let details = f.engine.details(id(3)).await.unwrap();
        assert_eq!(details.history[0].assignee, "Finn");
        assert!(details.history[0].is_open());
        assert_eq!(details.history[1].date_returned, Some(date("20.03.2025")));

        let kinds: Vec<_> = f.mirror.events().await.iter().map(MirrorEvent::kind).collect();
        assert_eq!(kinds, ["assigned", "returned", "assigned"]);
    }

    #[tokio::test]
    async fn backdated_handover_is_rejected() {
        let f = fixture("01.03.2025").await;
        f.engine.assign(id(1), AssignRequest::new("Eve")).await.unwrap();

        let err = f
            .engine
            .assign(id(1), AssignRequest::new("Finn").taken_on(date("01.02.2025")))
            .await
            .unwrap_err();
        assert!(matches!(err, TerritoryError::InvalidArgument(_)));

        let details = f.engine.details(id(1)).await.unwrap();
        assert_eq!(details.territory.assignee, "Eve");
        assert_eq!(details.history.len(), 1);
        assert!(details.history[0].is_open());
        assert_eq!(f.mirror.events().await.len(), 1);

        f.engine
            .assign(id(1), AssignRequest::new("Finn").taken_on(date("01.03.2025")))
            .await
            .unwrap();
        let history = f.engine.details(id(1)).await.unwrap().history;
        assert_eq!(history[1].date_returned, Some(date("01.03.2025")));
    }

    #[tokio::test]
    async fn redating_the_same_holder_moves_the_open_entry() {
        let f = fixture("01.03.2025").await;
        f.engine.assign(id(2), AssignRequest::new("Eve")).await.unwrap();

        let edited = f
            .engine
            .assign(id(2), AssignRequest::new("Eve").taken_on(date("10.03.2025")))
            .await
            .unwrap();
        assert_eq!(edited.date_taken, Some(date("10.03.2025")));
        assert_eq!(edited.date_due, Some(date("08.07.2025")));

        let history = f.engine.details(id(2)).await.unwrap().history;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].date_taken, date("10.03.2025"));
        assert!(history[0].is_open());
    }

    #[tokio::test]
    async fn release_with_notes_saves_both_together() {
        let f = fixture("01.03.2025").await;
        f.engine
            .assign(id(5), AssignRequest::new("Hal").notes("old"))
            .await
            .unwrap();

        let released = f
            .engine
            .release_with_notes(id(5), Some("returned keys".to_string()))
            .await
            .unwrap();
        assert!(!released.is_assigned());
        assert_eq!(released.notes, "returned keys");
        assert_eq!(
            f.engine.store().get_territory(id(5)).await.unwrap().notes,
            "returned keys"
        );

        let err = f
            .engine
            .release_with_notes(id(5), Some("ignored".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, TerritoryError::Conflict(_)));
        assert_eq!(
            f.engine.store().get_territory(id(5)).await.unwrap().notes,
            "returned keys"
        );
    }

    #[tokio::test]
    async fn clear_history_can_drop_notes() {
        let f = fixture("01.03.2025").await;
        f.engine
            .assign(id(4), AssignRequest::new("Gus").notes("gate code 12"))
            .await
            .unwrap();

        let kept = f.engine.clear_history(id(4), NotesPolicy::Preserve).await.unwrap();
        assert_eq!(kept.notes, "gate code 12");
        assert!(!kept.is_assigned());

        let wiped = f.engine.clear_history(id(4), NotesPolicy::Clear).await.unwrap();
        assert_eq!(wiped.notes, "");
        assert!(f.engine.details(id(4)).await.unwrap().history.is_empty());
        assert!(f.mirror.block(id(4)).await.slots().iter().all(|slot| slot.is_empty()));
    }

    #[tokio::test]
    async fn overview_flags_due_soon() {
        let f = fixture("01.01.2025").await;
        f.engine.assign(id(1), AssignRequest::new("Ann")).await.unwrap();
        f.engine
            .assign(id(2), AssignRequest::new("Ben").due_on(date("05.01.2025")))
            .await
            .unwrap();

        let overview = f.engine.overview().await;
        assert_eq!(overview.taken.len(), 2);
        assert!(!overview.taken[0].due_soon);
        assert!(overview.taken[1].due_soon);
        assert_eq!(overview.free.len(), 8);
        assert_eq!(overview.free[0].id, id(3));
    }

    #[tokio::test]
    async fn notes_update_leaves_status_alone() {
        let f = fixture("01.01.2025").await;
        let updated = f.engine.update_notes(id(6), "dog at no. 4").await.unwrap();
        assert_eq!(updated.notes, "dog at no. 4");
        assert!(!updated.is_assigned());
        assert!(matches!(
            f.engine.update_notes(id(60), "x").await,
            Err(TerritoryError::NotFound(_))
        ));
    }
}
