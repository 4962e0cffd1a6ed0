//! Domain Event Publisher (C12, §4.4): transactional-outbox dispatcher.
//!
//! The outbox row is written atomically alongside its mirrored event by whatever
//! persists the aggregate; this dispatcher only reads pending rows and publishes
//! them to the bus, per-aggregate in sequence order. Redelivery on crash is
//! permitted — subscribers MUST be idempotent on `(aggregateId, sequenceNumber)`.

use crate::error::PlatformResult;
use crate::ports::{BusPort, OutboxPort};
use std::sync::Arc;

pub struct OutboxDispatcher {
    outbox: Arc<dyn OutboxPort>,
    bus: Arc<dyn BusPort>,
}

impl OutboxDispatcher {
    pub fn new(outbox: Arc<dyn OutboxPort>, bus: Arc<dyn BusPort>) -> Self {
        Self { outbox, bus }
    }

    /// One dispatch pass: publish every pending row, per aggregate, oldest first.
    /// Returns the number of rows successfully dispatched.
    pub async fn dispatch_pending(&self) -> PlatformResult<usize> {
        let mut dispatched = 0;
        for aggregate_id in self.outbox.aggregates_with_pending_rows().await? {
            let mut rows = self.outbox.pending_for_aggregate(&aggregate_id).await?;
            rows.sort_by_key(|row| row.sequence_number);
            for row in rows {
                self.bus.publish(row.event.clone()).await?;
                self.outbox.mark_dispatched(&row.id).await?;
                dispatched += 1;
            }
        }
        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{DomainEvent, OutboxRow, OutboxStatus};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryOutbox {
        rows: Mutex<HashMap<String, OutboxRow>>,
    }

    #[async_trait]
    impl OutboxPort for InMemoryOutbox {
        async fn append(&self, row: OutboxRow) -> PlatformResult<()> {
            self.rows.lock().unwrap().insert(row.id.clone(), row);
            Ok(())
        }
        async fn pending_for_aggregate(&self, aggregate_id: &str) -> PlatformResult<Vec<OutboxRow>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.aggregate_id == aggregate_id && r.status == OutboxStatus::Pending)
                .cloned()
                .collect())
        }
        async fn aggregates_with_pending_rows(&self) -> PlatformResult<Vec<String>> {
            let rows = self.rows.lock().unwrap();
            let mut ids: Vec<String> = rows
                .values()
                .filter(|r| r.status == OutboxStatus::Pending)
                .map(|r| r.aggregate_id.clone())
                .collect();
            ids.sort();
            ids.dedup();
            Ok(ids)
        }
        async fn mark_dispatched(&self, row_id: &str) -> PlatformResult<()> {
            if let Some(row) = self.rows.lock().unwrap().get_mut(row_id) {
                row.status = OutboxStatus::Dispatched;
                row.dispatched_at = Some(chrono::Utc::now());
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingBus {
        published: Mutex<Vec<DomainEvent>>,
    }

    #[async_trait]
    impl BusPort for RecordingBus {
        async fn publish(&self, event: DomainEvent) -> PlatformResult<()> {
            self.published.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn outbox_row(aggregate_id: &str, sequence_number: u64) -> OutboxRow {
        let event = DomainEvent::new(
            aggregate_id,
            "Consent",
            sequence_number,
            "ConsentCreatedEvent",
            1,
            "corr-1",
            None,
            serde_json::json!({}),
        );
        OutboxRow {
            id: format!("{aggregate_id}-{sequence_number}"),
            aggregate_id: aggregate_id.to_string(),
            sequence_number,
            event,
            status: OutboxStatus::Pending,
            dispatched_at: None,
        }
    }

    #[tokio::test]
    async fn dispatches_pending_rows_in_sequence_order() {
        let outbox = Arc::new(InMemoryOutbox::default());
        outbox.append(outbox_row("consent-1", 2)).await.unwrap();
        outbox.append(outbox_row("consent-1", 1)).await.unwrap();
        let bus = Arc::new(RecordingBus::default());
        let dispatcher = OutboxDispatcher::new(outbox.clone(), bus.clone());

        let count = dispatcher.dispatch_pending().await.unwrap();
        assert_eq!(count, 2);

        let published = bus.published.lock().unwrap();
        assert_eq!(published[0].sequence_number, 1);
        assert_eq!(published[1].sequence_number, 2);
        assert_eq!(outbox.aggregates_with_pending_rows().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn already_dispatched_rows_are_skipped() {
        let outbox = Arc::new(InMemoryOutbox::default());
        outbox.append(outbox_row("consent-2", 1)).await.unwrap();
        let bus = Arc::new(RecordingBus::default());
        let dispatcher = OutboxDispatcher::new(outbox.clone(), bus.clone());

        assert_eq!(dispatcher.dispatch_pending().await.unwrap(), 1);
        assert_eq!(dispatcher.dispatch_pending().await.unwrap(), 0);
    }
}
