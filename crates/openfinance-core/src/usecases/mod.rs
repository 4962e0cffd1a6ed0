//! Use-case services (C10), each following the common skeleton from §4.5:
//! resolve/authorize the consent, enforce idempotency, run business logic, persist.

pub mod ais;
pub mod bulk_payments;
pub mod consent;
pub mod fx;

use crate::domain::consent::{Consent, ConsentStatus};
use crate::error::{PlatformError, PlatformResult};
use crate::ports::{ConsentPort, IdempotencyPort, IdempotencyRecord};
use chrono::{DateTime, Utc};

/// Skeleton step 2: load a consent and verify it belongs to the caller, is
/// AUTHORIZED, unexpired, and carries `required_scope`. Any failure is FORBIDDEN.
pub async fn load_authorized_consent(
    consent_port: &dyn ConsentPort,
    consent_id: &str,
    participant_id: &str,
    required_scope: &str,
    now: DateTime<Utc>,
) -> PlatformResult<Consent> {
    let consent = consent_port.load(consent_id).await?;
    if consent.participant_id != participant_id {
        return Err(PlatformError::authorization("FORBIDDEN", "consent does not belong to this participant"));
    }
    if consent.status != ConsentStatus::Authorized {
        return Err(PlatformError::authorization("FORBIDDEN", "consent is not authorized"));
    }
    if let Some(expires_at) = consent.expires_at {
        if now >= expires_at {
            return Err(PlatformError::authorization("FORBIDDEN", "consent has expired"));
        }
    }
    if !consent.has_scope(required_scope) {
        return Err(PlatformError::authorization(
            "FORBIDDEN",
            format!("consent missing required scope '{required_scope}'"),
        ));
    }
    Ok(consent)
}

/// Skeleton step 3: look up `(idempotencyKey, participantId)`. `Ok(Some(_))` means
/// the caller already has a result to return; `Ok(None)` means proceed.
pub async fn check_idempotency(
    idempotency_port: &dyn IdempotencyPort,
    idempotency_key: &str,
    participant_id: &str,
    request_hash: &str,
) -> PlatformResult<Option<IdempotencyRecord>> {
    match idempotency_port.get(idempotency_key, participant_id).await? {
        Some(existing) if existing.request_hash == request_hash => Ok(Some(existing)),
        Some(_) => Err(PlatformError::idempotency_conflict(
            "idempotency key replayed with a different request hash",
        )),
        None => Ok(None),
    }
}
