use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire/storage envelope for a published domain event (§6.3).
///
/// Payload schema per `event_type` is versioned; consumers MUST ignore unknown fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainEvent {
    pub event_id: String,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub sequence_number: u64,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub correlation_id: String,
    pub causation_id: Option<String>,
    pub payload: serde_json::Value,
}

impl DomainEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        aggregate_id: impl Into<String>,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        event_type: impl Into<String>,
        event_version: u32,
        correlation_id: impl Into<String>,
        causation_id: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            aggregate_id: aggregate_id.into(),
            aggregate_type: aggregate_type.into(),
            sequence_number,
            event_type: event_type.into(),
            event_version,
            occurred_at: Utc::now(),
            correlation_id: correlation_id.into(),
            causation_id,
            payload,
        }
    }
}

/// Outbox row status (C12): transactional-outbox pattern, atomically persisted
/// alongside the events it mirrors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Dispatched,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboxRow {
    pub id: String,
    pub aggregate_id: String,
    pub sequence_number: u64,
    pub event: DomainEvent,
    pub status: OutboxStatus,
    pub dispatched_at: Option<DateTime<Utc>>,
}
