use async_trait::async_trait;
use openfinance_core::domain::consent::{Consent, ConsentEvent};
use openfinance_core::domain::events::{OutboxRow, OutboxStatus};
use openfinance_core::error::{PlatformError, PlatformResult};
use openfinance_core::ports::{ConsentPort, EventStorePort, OutboxPort};
use std::sync::Arc;

/// `ConsentPort` grounded on the event store + transactional outbox (C5 + C7 + C12):
/// loading rehydrates the aggregate from its full event stream, saving appends the
/// new events under an optimistic-concurrency check and mirrors them into the
/// outbox in the same call.
pub struct EventSourcedConsentRepository {
    event_store: Arc<dyn EventStorePort>,
    outbox: Arc<dyn OutboxPort>,
}

impl EventSourcedConsentRepository {
    pub fn new(event_store: Arc<dyn EventStorePort>, outbox: Arc<dyn OutboxPort>) -> Self {
        Self { event_store, outbox }
    }
}

#[async_trait]
impl ConsentPort for EventSourcedConsentRepository {
    async fn load(&self, consent_id: &str) -> PlatformResult<Consent> {
        let events = self.event_store.load_events(consent_id, 0).await?;
        if events.is_empty() {
            return Err(PlatformError::not_found(format!(
                "consent '{consent_id}' not found"
            )));
        }
        Consent::rehydrate(consent_id, &events)
    }

    async fn save(&self, consent: &Consent, new_events: Vec<ConsentEvent>) -> PlatformResult<()> {
        if new_events.is_empty() {
            return Ok(());
        }
        let expected_sequence = new_events[0].sequence_number - 1;
        self.event_store
            .append(&consent.consent_id, expected_sequence, new_events.clone())
            .await?;

        for event in new_events {
            self.outbox
                .append(OutboxRow {
                    id: event.event_id.clone(),
                    aggregate_id: event.aggregate_id.clone(),
                    sequence_number: event.sequence_number,
                    event,
                    status: OutboxStatus::Pending,
                    dispatched_at: None,
                })
                .await?;
        }
        Ok(())
    }
}
