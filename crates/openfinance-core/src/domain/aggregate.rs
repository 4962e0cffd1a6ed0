use crate::domain::events::DomainEvent;
use uuid::Uuid;

/// Small embedded event-sourced aggregate base. Concrete aggregates compose
/// this rather than inheriting from it (Design Note: "deep inheritance of
/// aggregate bases" is replaced with composition).
#[derive(Debug, Clone, Default)]
pub struct EventSourcedAggregate {
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub sequence: u64,
    pending: Vec<DomainEvent>,
}

impl EventSourcedAggregate {
    pub fn new(aggregate_id: impl Into<String>, aggregate_type: impl Into<String>) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            aggregate_type: aggregate_type.into(),
            sequence: 0,
            pending: Vec::new(),
        }
    }

    /// Build and stage the next event in sequence. Does not apply it to domain
    /// state; callers apply the returned event immediately for read-your-writes.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &mut self,
        event_type: impl Into<String>,
        event_version: u32,
        payload: serde_json::Value,
        correlation_id: impl Into<String>,
        causation_id: Option<String>,
    ) -> DomainEvent {
        self.sequence += 1;
        let event = DomainEvent::new(
            self.aggregate_id.clone(),
            self.aggregate_type.clone(),
            self.sequence,
            event_type,
            event_version,
            correlation_id,
            causation_id,
            payload,
        );
        self.pending.push(event.clone());
        event
    }

    pub fn pending_events(&self) -> &[DomainEvent] {
        &self.pending
    }

    pub fn mark_committed(&mut self) {
        self.pending.clear();
    }

    /// Fast-forward `sequence` without staging a pending event, used while
    /// replaying historical events during rehydration.
    pub fn observe_replayed(&mut self, sequence: u64) {
        self.sequence = sequence;
    }
}

pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}
