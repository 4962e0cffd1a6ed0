use crate::domain::aggregate::EventSourcedAggregate;
use crate::domain::events::DomainEvent;
use crate::error::{PlatformError, PlatformResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const AGGREGATE_TYPE: &str = "Consent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentStatus {
    Pending,
    Authorized,
    Used,
    Revoked,
    Expired,
    Rejected,
}

impl ConsentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Revoked | Self::Expired | Self::Rejected)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsentUsageRecord {
    pub accessed_at: DateTime<Utc>,
    pub resource: String,
    pub actor: String,
}

/// An alias kept for call sites that think in terms of "the event for this
/// consent" — structurally identical to the generic `DomainEvent` envelope.
pub type ConsentEvent = DomainEvent;

/// Rich domain object (C7): state transitions and emitted domain events.
/// Embeds `EventSourcedAggregate` by composition, not inheritance.
#[derive(Debug, Clone)]
pub struct Consent {
    base: EventSourcedAggregate,
    pub consent_id: String,
    pub customer_id: String,
    pub participant_id: String,
    pub scopes: BTreeSet<String>,
    pub purpose: String,
    pub status: ConsentStatus,
    pub created_at: DateTime<Utc>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub usage_history: Vec<ConsentUsageRecord>,
    pub account_whitelist: BTreeSet<String>,
}

/// Request fields for creating a consent.
pub struct CreateConsentRequest {
    pub consent_id: String,
    pub customer_id: String,
    pub participant_id: String,
    pub scopes: BTreeSet<String>,
    pub purpose: String,
    pub validity_days: i64,
}

/// Authorization context. Per Open Question 4, the account whitelist is
/// assumed to be supplied as part of the authorize payload.
pub struct AuthorizeContext {
    pub account_whitelist: BTreeSet<String>,
}

impl Consent {
    fn empty(consent_id: impl Into<String>) -> Self {
        let consent_id = consent_id.into();
        Self {
            base: EventSourcedAggregate::new(consent_id.clone(), AGGREGATE_TYPE),
            consent_id,
            customer_id: String::new(),
            participant_id: String::new(),
            scopes: BTreeSet::new(),
            purpose: String::new(),
            status: ConsentStatus::Pending,
            created_at: Utc::now(),
            authorized_at: None,
            expires_at: None,
            revoked_at: None,
            usage_history: Vec::new(),
            account_whitelist: BTreeSet::new(),
        }
    }

    pub fn last_sequence(&self) -> u64 {
        self.base.sequence
    }

    pub fn pending_events(&self) -> &[DomainEvent] {
        self.base.pending_events()
    }

    pub fn mark_committed(&mut self) {
        self.base.mark_committed();
    }

    /// `create(request) -> ConsentCreatedEvent` (status PENDING).
    pub fn create(request: CreateConsentRequest, correlation_id: impl Into<String>) -> Self {
        let mut consent = Self::empty(request.consent_id);
        let now = Utc::now();
        let expires_at = now + chrono::Duration::days(request.validity_days.max(1));

        let payload = serde_json::json!({
            "customerId": request.customer_id,
            "participantId": request.participant_id,
            "scopes": request.scopes.iter().cloned().collect::<Vec<_>>(),
            "purpose": request.purpose,
            "createdAt": now,
            "expiresAt": expires_at,
        });
        let event = consent.base.record(
            "ConsentCreatedEvent",
            1,
            payload,
            correlation_id,
            None,
        );
        consent.apply(&event);
        consent
    }

    /// Rehydrate purely from a replayed event stream (round-trip law in §8).
    pub fn rehydrate(consent_id: impl Into<String>, events: &[DomainEvent]) -> PlatformResult<Self> {
        let mut consent = Self::empty(consent_id);
        for event in events {
            if event.sequence_number != consent.base.sequence + 1 {
                return Err(PlatformError::fatal(format!(
                    "non-contiguous event sequence for consent '{}': expected {}, got {}",
                    consent.consent_id,
                    consent.base.sequence + 1,
                    event.sequence_number
                )));
            }
            consent.base.observe_replayed(event.sequence_number);
            consent.apply(event);
        }
        Ok(consent)
    }

    fn apply(&mut self, event: &DomainEvent) {
        match event.event_type.as_str() {
            "ConsentCreatedEvent" => {
                self.customer_id = text(&event.payload, "customerId");
                self.participant_id = text(&event.payload, "participantId");
                self.scopes = string_set(&event.payload, "scopes");
                self.purpose = text(&event.payload, "purpose");
                self.created_at = datetime(&event.payload, "createdAt").unwrap_or(event.occurred_at);
                self.expires_at = datetime(&event.payload, "expiresAt");
                self.status = ConsentStatus::Pending;
            }
            "ConsentAuthorizedEvent" => {
                self.status = ConsentStatus::Authorized;
                self.authorized_at = Some(event.occurred_at);
                self.account_whitelist = string_set(&event.payload, "accountWhitelist");
            }
            "ConsentRejectedEvent" => {
                self.status = ConsentStatus::Rejected;
            }
            "ConsentUsedEvent" => {
                self.status = ConsentStatus::Used;
                self.usage_history.push(ConsentUsageRecord {
                    accessed_at: event.occurred_at,
                    resource: text(&event.payload, "resource"),
                    actor: text(&event.payload, "actor"),
                });
            }
            "ConsentRevokedEvent" => {
                self.status = ConsentStatus::Revoked;
                self.revoked_at = Some(event.occurred_at);
            }
            "ConsentExpiredEvent" => {
                self.status = ConsentStatus::Expired;
            }
            other => {
                tracing::warn!(event_type = other, "ignoring unknown consent event type");
            }
        }
    }

    fn guard_not_expired(&self, now: DateTime<Utc>) -> PlatformResult<()> {
        if let Some(expires_at) = self.expires_at {
            if now >= expires_at {
                return Err(PlatformError::authorization(
                    "CONSENT_EXPIRED",
                    format!("consent '{}' expired at {}", self.consent_id, expires_at),
                ));
            }
        }
        Ok(())
    }

    /// `authorize(authContext)` — PENDING -> AUTHORIZED; emits `ConsentAuthorizedEvent`.
    pub fn authorize(
        &mut self,
        context: AuthorizeContext,
        correlation_id: impl Into<String>,
    ) -> PlatformResult<DomainEvent> {
        if self.status != ConsentStatus::Pending {
            return Err(PlatformError::business_rule(
                "INVALID_CONSENT_TRANSITION",
                format!("cannot authorize consent in status {:?}", self.status),
            ));
        }

        let payload = serde_json::json!({
            "accountWhitelist": context.account_whitelist.iter().cloned().collect::<Vec<_>>(),
        });
        let event = self.base.record("ConsentAuthorizedEvent", 1, payload, correlation_id, None);
        self.apply(&event);
        Ok(event)
    }

    /// `reject(reason)` — PENDING -> REJECTED.
    pub fn reject(
        &mut self,
        reason: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> PlatformResult<DomainEvent> {
        if self.status != ConsentStatus::Pending {
            return Err(PlatformError::business_rule(
                "INVALID_CONSENT_TRANSITION",
                format!("cannot reject consent in status {:?}", self.status),
            ));
        }

        let payload = serde_json::json!({ "reason": reason.into() });
        let event = self.base.record("ConsentRejectedEvent", 1, payload, correlation_id, None);
        self.apply(&event);
        Ok(event)
    }

    /// `recordUsage(accessCtx)` — only while AUTHORIZED and not expired (Invariant 2).
    pub fn record_usage(
        &mut self,
        resource: impl Into<String>,
        actor: impl Into<String>,
        now: DateTime<Utc>,
        correlation_id: impl Into<String>,
    ) -> PlatformResult<DomainEvent> {
        if self.status != ConsentStatus::Authorized {
            return Err(PlatformError::authorization(
                "CONSENT_NOT_AUTHORIZED",
                format!("consent '{}' is not AUTHORIZED", self.consent_id),
            ));
        }
        self.guard_not_expired(now)?;

        let payload = serde_json::json!({
            "resource": resource.into(),
            "actor": actor.into(),
        });
        let event = self.base.record("ConsentUsedEvent", 1, payload, correlation_id, None);
        self.apply(&event);
        Ok(event)
    }

    /// `revoke(actor, reason)` — AUTHORIZED -> REVOKED.
    pub fn revoke(
        &mut self,
        actor: impl Into<String>,
        reason: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> PlatformResult<DomainEvent> {
        if self.status != ConsentStatus::Authorized {
            return Err(PlatformError::business_rule(
                "INVALID_CONSENT_TRANSITION",
                format!("cannot revoke consent in status {:?}", self.status),
            ));
        }

        let payload = serde_json::json!({ "actor": actor.into(), "reason": reason.into() });
        let event = self.base.record("ConsentRevokedEvent", 1, payload, correlation_id, None);
        self.apply(&event);
        Ok(event)
    }

    /// `expire()` — any non-terminal -> EXPIRED once `now >= expiresAt`.
    pub fn expire(
        &mut self,
        now: DateTime<Utc>,
        correlation_id: impl Into<String>,
    ) -> PlatformResult<Option<DomainEvent>> {
        if self.status.is_terminal() {
            return Ok(None);
        }
        let Some(expires_at) = self.expires_at else {
            return Ok(None);
        };
        if now < expires_at {
            return Ok(None);
        }

        let event = self.base.record("ConsentExpiredEvent", 1, serde_json::json!({}), correlation_id, None);
        self.apply(&event);
        Ok(Some(event))
    }

    pub fn allows_account(&self, account_id: &str) -> bool {
        self.account_whitelist.is_empty() || self.account_whitelist.contains(account_id)
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

fn text(payload: &serde_json::Value, field: &str) -> String {
    payload.get(field).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

fn string_set(payload: &serde_json::Value, field: &str) -> BTreeSet<String> {
    payload
        .get(field)
        .and_then(|v| v.as_array())
        .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn datetime(payload: &serde_json::Value, field: &str) -> Option<DateTime<Utc>> {
    payload.get(field).and_then(|v| v.as_str()).and_then(|s| DateTime::parse_from_rfc3339(s).ok()).map(|dt| dt.with_timezone(&Utc))
}
