//! Best-effort mirroring of territory assignments into a spreadsheet.
//!
//! The mirror is never authoritative. Callers deliver events after the local
//! commit and only log failures.

pub mod memory;
pub mod queued;
pub mod sheets;
pub mod slots;

use crate::core::TerritoryId;
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

pub use memory::MemoryMirror;
pub use queued::QueuedMirror;
pub use sheets::{RetryPolicy, SheetsConfig, SheetsMirror};
pub use slots::{Slot, SlotBlock};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MirrorError {
    #[error("Mirror transport error: {0}")]
    Transport(String),

    #[error("Mirror returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Mirror response could not be decoded: {0}")]
    Decode(String),

    #[error("Mirror queue is closed")]
    QueueClosed,

    #[error("Territory {0} has no block in the mirror sheet")]
    OutOfRange(TerritoryId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorEvent {
    Assigned {
        territory_id: TerritoryId,
        assignee: String,
        date_taken: NaiveDate,
        date_due: NaiveDate,
    },
    Returned {
        territory_id: TerritoryId,
        date_returned: NaiveDate,
    },
    Cleared {
        territory_id: TerritoryId,
    },
}

impl MirrorEvent {
    pub fn territory_id(&self) -> TerritoryId {
        match self {
            Self::Assigned { territory_id, .. }
            | Self::Returned { territory_id, .. }
            | Self::Cleared { territory_id } => *territory_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Assigned { .. } => "assigned",
            Self::Returned { .. } => "returned",
            Self::Cleared { .. } => "cleared",
        }
    }
}

#[async_trait]
pub trait MirrorSink: Send + Sync {
    async fn notify_assigned(
        &self,
        territory_id: TerritoryId,
        assignee: &str,
        date_taken: NaiveDate,
        date_due: NaiveDate,
    ) -> Result<(), MirrorError>;

    async fn notify_returned(
        &self,
        territory_id: TerritoryId,
        date_returned: NaiveDate,
    ) -> Result<(), MirrorError>;

    async fn clear_record(&self, territory_id: TerritoryId) -> Result<(), MirrorError>;
}

pub async fn deliver(sink: &dyn MirrorSink, event: &MirrorEvent) -> Result<(), MirrorError> {
    match event {
        MirrorEvent::Assigned {
            territory_id,
            assignee,
            date_taken,
            date_due,
        } => {
            sink.notify_assigned(*territory_id, assignee, *date_taken, *date_due)
                .await
        }
        MirrorEvent::Returned {
            territory_id,
            date_returned,
        } => sink.notify_returned(*territory_id, *date_returned).await,
        MirrorEvent::Cleared { territory_id } => sink.clear_record(*territory_id).await,
    }
}

/// Sink used when no spreadsheet is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMirror;

#[async_trait]
impl MirrorSink for NoopMirror {
    async fn notify_assigned(
        &self,
        _territory_id: TerritoryId,
        _assignee: &str,
        _date_taken: NaiveDate,
        _date_due: NaiveDate,
    ) -> Result<(), MirrorError> {
        Ok(())
    }

    async fn notify_returned(
        &self,
        _territory_id: TerritoryId,
        _date_returned: NaiveDate,
    ) -> Result<(), MirrorError> {
        Ok(())
    }

    async fn clear_record(&self, _territory_id: TerritoryId) -> Result<(), MirrorError> {
        Ok(())
    }
}
