use async_trait::async_trait;
use openfinance_core::domain::events::DomainEvent;
use openfinance_core::error::PlatformResult;
use openfinance_core::ports::BusPort;
use std::sync::Mutex;

pub type PublishedEvent = DomainEvent;

/// In-process bus: records every publish for test assertions and emits a
/// structured log line per §10.1, keyed by the correlation id the event carries.
#[derive(Default)]
pub struct InMemoryBus {
    published: Mutex<Vec<PublishedEvent>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<PublishedEvent> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl BusPort for InMemoryBus {
    async fn publish(&self, event: DomainEvent) -> PlatformResult<()> {
        tracing::info!(
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            sequence_number = event.sequence_number,
            correlation_id = %event.correlation_id,
            "publishing domain event"
        );
        self.published.lock().unwrap().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_records_the_event() {
        let bus = InMemoryBus::new();
        bus.publish(DomainEvent::new(
            "consent-1",
            "Consent",
            1,
            "ConsentCreatedEvent",
            1,
            "corr-1",
            None,
            serde_json::json!({}),
        ))
        .await
        .unwrap();

        assert_eq!(bus.published().len(), 1);
    }
}
