use async_trait::async_trait;
use openfinance_core::error::PlatformResult;
use openfinance_core::ports::{IdempotencyPort, IdempotencyRecord};
use std::collections::HashMap;
use std::sync::Mutex;

fn key(idempotency_key: &str, participant_id: &str) -> String {
    format!("{participant_id}:{idempotency_key}")
}

/// Durable `(idempotencyKey, participantId) -> resourceId` mapping (C3). Atomic
/// set-if-absent under a single lock.
#[derive(Default)]
pub struct InMemoryIdempotency {
    records: Mutex<HashMap<String, IdempotencyRecord>>,
}

impl InMemoryIdempotency {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyPort for InMemoryIdempotency {
    async fn set_if_absent(
        &self,
        record: IdempotencyRecord,
    ) -> PlatformResult<Option<IdempotencyRecord>> {
        let mut records = self.records.lock().unwrap();
        let map_key = key(&record.idempotency_key, &record.participant_id);
        if let Some(existing) = records.get(&map_key) {
            return Ok(Some(existing.clone()));
        }
        records.insert(map_key, record);
        Ok(None)
    }

    async fn get(
        &self,
        idempotency_key: &str,
        participant_id: &str,
    ) -> PlatformResult<Option<IdempotencyRecord>> {
        Ok(self.records.lock().unwrap().get(&key(idempotency_key, participant_id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(resource_id: &str, request_hash: &str) -> IdempotencyRecord {
        IdempotencyRecord {
            idempotency_key: "K1".to_string(),
            participant_id: "T1".to_string(),
            request_hash: request_hash.to_string(),
            resource_id: resource_id.to_string(),
            status: "COMPLETED".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(24),
        }
    }

    #[tokio::test]
    async fn second_set_with_same_key_returns_the_first_record() {
        let store = InMemoryIdempotency::new();
        assert!(store.set_if_absent(record("F1", "H1")).await.unwrap().is_none());

        let existing = store.set_if_absent(record("F2", "H2")).await.unwrap().unwrap();
        assert_eq!(existing.resource_id, "F1");
        assert_eq!(existing.request_hash, "H1");
    }

    #[tokio::test]
    async fn get_is_namespaced_by_participant() {
        let store = InMemoryIdempotency::new();
        store.set_if_absent(record("F1", "H1")).await.unwrap();
        assert!(store.get("K1", "T1").await.unwrap().is_some());
        assert!(store.get("K1", "OTHER").await.unwrap().is_none());
    }
}
