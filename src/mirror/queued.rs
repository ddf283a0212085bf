use crate::core::TerritoryId;
use crate::mirror::{MirrorError, MirrorEvent, MirrorSink, deliver};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

enum Command {
    Deliver(MirrorEvent),
    Flush(oneshot::Sender<()>),
}

/// Hands events to a background task so callers never wait on the
/// spreadsheet. Events are delivered one at a time, in submission order.
#[derive(Clone)]
pub struct QueuedMirror {
    sender: mpsc::UnboundedSender<Command>,
}

impl QueuedMirror {
    /// The worker stops once every clone of the returned handle is dropped.
    pub fn spawn(inner: Arc<dyn MirrorSink>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel();

        let worker = tokio::spawn(async move {
            while let Some(command) = receiver.recv().await {
                match command {
                    Command::Deliver(event) => {
                        match deliver(inner.as_ref(), &event).await {
                            Ok(()) => debug!(
                                territory_id = %event.territory_id(),
                                kind = event.kind(),
                                "mirror event delivered"
                            ),
                            Err(err) => warn!(
                                territory_id = %event.territory_id(),
                                kind = event.kind(),
                                error = %err,
                                "mirror event dropped"
                            ),
                        }
                    }
                    Command::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("mirror queue closed");
        });

        (Self { sender }, worker)
    }

    /// Waits until every event submitted before this call was handled.
    pub async fn flush(&self) -> Result<(), MirrorError> {
        let (done, wait) = oneshot::channel();
        self.sender
            .send(Command::Flush(done))
            .map_err(|_| MirrorError::QueueClosed)?;
        wait.await.map_err(|_| MirrorError::QueueClosed)
    }

    fn enqueue(&self, event: MirrorEvent) -> Result<(), MirrorError> {
        self.sender
            .send(Command::Deliver(event))
            .map_err(|_| MirrorError::QueueClosed)
    }
}

#[async_trait]
impl MirrorSink for QueuedMirror {
    async fn notify_assigned(
        &self,
        territory_id: TerritoryId,
        assignee: &str,
        date_taken: NaiveDate,
        date_due: NaiveDate,
    ) -> Result<(), MirrorError> {
        self.enqueue(MirrorEvent::Assigned {
            territory_id,
            assignee: assignee.to_string(),
            date_taken,
            date_due,
        })
    }

    async fn notify_returned(
        &self,
        territory_id: TerritoryId,
        date_returned: NaiveDate,
    ) -> Result<(), MirrorError> {
        self.enqueue(MirrorEvent::Returned {
            territory_id,
            date_returned,
        })
    }

    async fn clear_record(&self, territory_id: TerritoryId) -> Result<(), MirrorError> {
        self.enqueue(MirrorEvent::Cleared { territory_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::MemoryMirror;

    #[tokio::test]
    async fn events_reach_inner_sink_in_order() {
        let inner = Arc::new(MemoryMirror::new());
        let (queue, worker) = QueuedMirror::spawn(inner.clone());
        let id = TerritoryId::new(4).unwrap();
        let day = |d| NaiveDate::from_ymd_opt(2025, 3, d).unwrap();

        queue
            .notify_assigned(id, "Bob", day(1), day(2))
            .await
            .unwrap();
        queue.notify_returned(id, day(10)).await.unwrap();
        queue.flush().await.unwrap();

        let kinds: Vec<_> = inner.events().await.iter().map(MirrorEvent::kind).collect();
        assert_eq!(kinds, ["assigned", "returned"]);
        assert_eq!(inner.block(id).await.slots()[0].due, "10.03.2025");

        drop(queue);
        worker.await.unwrap();
    }
}
