use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantRole {
    Aisp,
    Pisp,
    Cbpii,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantStatus {
    Active,
    Suspended,
    Revoked,
}

/// Identity of a TPP (C2 data). A request may only proceed if the participant
/// was ACTIVE at validation time with a non-expired trust-framework validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub participant_id: String,
    pub legal_name: String,
    pub role: ParticipantRole,
    pub status: ParticipantStatus,
    pub certificate_thumbprints: Vec<String>,
    pub validated_until: Option<DateTime<Utc>>,
}

/// Result of a trust-framework lookup, cacheable for `min(validUntil - now, maxTtl)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub participant_id: String,
    pub status: ParticipantStatus,
    pub valid_until: DateTime<Utc>,
}

impl ValidationResult {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == ParticipantStatus::Active && now < self.valid_until
    }
}
