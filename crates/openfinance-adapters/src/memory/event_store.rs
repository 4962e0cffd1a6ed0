use async_trait::async_trait;
use openfinance_core::domain::consent::ConsentEvent;
use openfinance_core::error::{PlatformError, PlatformResult};
use openfinance_core::ports::EventStorePort;
use std::collections::HashMap;
use std::sync::Mutex;

/// Append-only per-aggregate event log, guarded by a single lock (C5).
/// Optimistic concurrency is enforced against `expected_sequence` before
/// any event is appended.
#[derive(Default)]
pub struct InMemoryEventStore {
    streams: Mutex<HashMap<String, Vec<ConsentEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStorePort for InMemoryEventStore {
    async fn append(
        &self,
        aggregate_id: &str,
        expected_sequence: u64,
        events: Vec<ConsentEvent>,
    ) -> PlatformResult<()> {
        let mut streams = self.streams.lock().unwrap();
        let stream = streams.entry(aggregate_id.to_string()).or_default();
        let actual_sequence = stream.last().map(|e| e.sequence_number).unwrap_or(0);
        if actual_sequence != expected_sequence {
            return Err(PlatformError::concurrency(format!(
                "aggregate '{aggregate_id}' expected sequence {expected_sequence}, found {actual_sequence}"
            )));
        }
        stream.extend(events);
        Ok(())
    }

    async fn load_events(
        &self,
        aggregate_id: &str,
        after_sequence: u64,
    ) -> PlatformResult<Vec<ConsentEvent>> {
        let streams = self.streams.lock().unwrap();
        Ok(streams
            .get(aggregate_id)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|e| e.sequence_number > after_sequence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn last_sequence(&self, aggregate_id: &str) -> PlatformResult<u64> {
        let streams = self.streams.lock().unwrap();
        Ok(streams
            .get(aggregate_id)
            .and_then(|stream| stream.last())
            .map(|e| e.sequence_number)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(aggregate_id: &str, sequence_number: u64) -> ConsentEvent {
        ConsentEvent::new(
            aggregate_id,
            "Consent",
            sequence_number,
            "ConsentCreatedEvent",
            1,
            "corr-1",
            None,
            serde_json::json!({}),
        )
    }

    #[tokio::test]
    async fn appends_in_order_and_loads_after_sequence() {
        let store = InMemoryEventStore::new();
        store.append("c1", 0, vec![event("c1", 1)]).await.unwrap();
        store.append("c1", 1, vec![event("c1", 2)]).await.unwrap();

        let events = store.load_events("c1", 0).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(store.last_sequence("c1").await.unwrap(), 2);

        let tail = store.load_events("c1", 1).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].sequence_number, 2);
    }

    #[tokio::test]
    async fn mismatched_expected_sequence_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        store.append("c1", 0, vec![event("c1", 1)]).await.unwrap();

        let err = store.append("c1", 0, vec![event("c1", 2)]).await.unwrap_err();
        assert_eq!(err.error_code(), "CONCURRENCY");
    }
}
