use crate::core::TerritoryId;
use crate::mirror::slots::SlotBlock;
use crate::mirror::{MirrorError, MirrorEvent, MirrorSink};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// In-process stand-in for the spreadsheet: keeps the slot blocks and the
/// delivered events. Useful for local runs without a spreadsheet and for
/// tests.
#[derive(Default)]
pub struct MemoryMirror {
    blocks: Mutex<HashMap<TerritoryId, SlotBlock>>,
    events: Mutex<Vec<MirrorEvent>>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn block(&self, territory_id: TerritoryId) -> SlotBlock {
        self.blocks
            .lock()
            .await
            .get(&territory_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn events(&self) -> Vec<MirrorEvent> {
        self.events.lock().await.clone()
    }

    async fn apply<F>(&self, event: MirrorEvent, change: F)
    where
        F: FnOnce(&mut SlotBlock),
    {
        let mut blocks = self.blocks.lock().await;
        change(blocks.entry(event.territory_id()).or_default());
        self.events.lock().await.push(event);
    }
}

#[async_trait]
impl MirrorSink for MemoryMirror {
    async fn notify_assigned(
        &self,
        territory_id: TerritoryId,
        assignee: &str,
        date_taken: NaiveDate,
        date_due: NaiveDate,
    ) -> Result<(), MirrorError> {
        let event = MirrorEvent::Assigned {
            territory_id,
            assignee: assignee.to_string(),
            date_taken,
            date_due,
        };
        self.apply(event, |block| {
            block.record_assignment(assignee, date_taken, date_due)
        })
        .await;
        Ok(())
    }

    async fn notify_returned(
        &self,
        territory_id: TerritoryId,
        date_returned: NaiveDate,
    ) -> Result<(), MirrorError> {
        let event = MirrorEvent::Returned {
            territory_id,
            date_returned,
        };
        self.apply(event, |block| block.record_return(date_returned))
            .await;
        Ok(())
    }

    async fn clear_record(&self, territory_id: TerritoryId) -> Result<(), MirrorError> {
        self.apply(MirrorEvent::Cleared { territory_id }, SlotBlock::clear)
            .await;
        Ok(())
    }
}
