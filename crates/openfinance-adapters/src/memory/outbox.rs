use async_trait::async_trait;
use chrono::Utc;
use openfinance_core::domain::events::{OutboxRow, OutboxStatus};
use openfinance_core::error::PlatformResult;
use openfinance_core::ports::OutboxPort;
use std::collections::HashMap;
use std::sync::Mutex;

/// Transactional-outbox storage (C12). In a Postgres deployment this table is
/// written in the same local transaction as the event-store append it mirrors;
/// here the single `Mutex` plays that role for the in-process case.
#[derive(Default)]
pub struct InMemoryOutbox {
    rows: Mutex<HashMap<String, OutboxRow>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }
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
            .filter(|row| row.aggregate_id == aggregate_id && row.status == OutboxStatus::Pending)
            .cloned()
            .collect())
    }

    async fn aggregates_with_pending_rows(&self) -> PlatformResult<Vec<String>> {
        let rows = self.rows.lock().unwrap();
        let mut ids: Vec<String> = rows
            .values()
            .filter(|row| row.status == OutboxStatus::Pending)
            .map(|row| row.aggregate_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn mark_dispatched(&self, row_id: &str) -> PlatformResult<()> {
        if let Some(row) = self.rows.lock().unwrap().get_mut(row_id) {
            row.status = OutboxStatus::Dispatched;
            row.dispatched_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(aggregate_id: &str, sequence_number: u64) -> OutboxRow {
        let event = openfinance_core::domain::events::DomainEvent::new(
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
    async fn tracks_pending_rows_until_dispatched() {
        let outbox = InMemoryOutbox::new();
        outbox.append(row("c1", 1)).await.unwrap();
        assert_eq!(outbox.aggregates_with_pending_rows().await.unwrap(), vec!["c1"]);

        outbox.mark_dispatched("c1-1").await.unwrap();
        assert!(outbox.aggregates_with_pending_rows().await.unwrap().is_empty());
    }
}
