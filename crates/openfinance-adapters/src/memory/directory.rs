use async_trait::async_trait;
use chrono::{DateTime, Utc};
use openfinance_core::domain::participant::{ParticipantStatus, ValidationResult};
use openfinance_core::error::{PlatformError, PlatformResult};
use openfinance_core::ports::DirectoryPort;
use std::collections::HashMap;
use std::sync::Mutex;

/// Fixture trust-framework directory (C2). Statuses are seeded up front;
/// a real deployment calls out to CBUAE and caches the result at the adapter
/// that wraps this trait (§4.7's `min(validUntil - now, maxTtl)` policy lives
/// one layer up, in the caching decorator, not here).
#[derive(Default)]
pub struct InMemoryDirectory {
    participants: Mutex<HashMap<String, ValidationResult>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, result: ValidationResult) {
        self.participants.lock().unwrap().insert(result.participant_id.clone(), result);
    }
}

#[async_trait]
impl DirectoryPort for InMemoryDirectory {
    async fn validate(&self, participant_id: &str, _now: DateTime<Utc>) -> PlatformResult<ValidationResult> {
        self.participants
            .lock()
            .unwrap()
            .get(participant_id)
            .cloned()
            .ok_or_else(|| PlatformError::not_found(format!("participant '{participant_id}' unknown to directory")))
    }
}
