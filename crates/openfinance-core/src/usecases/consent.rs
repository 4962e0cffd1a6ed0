//! Consent lifecycle entry points (C7, §4.3). Thin orchestration over the
//! aggregate: load/authorize-check, call the domain method, persist.

use crate::domain::consent::{AuthorizeContext, Consent, CreateConsentRequest};
use crate::error::{PlatformError, PlatformResult};
use crate::ports::ConsentPort;
use uuid::Uuid;

pub const SCOPE_CONSENTS_WRITE: &str = "consents:write";

pub async fn create_consent(
    consent_port: &dyn ConsentPort,
    request: CreateConsentRequest,
    correlation_id: &str,
) -> PlatformResult<Consent> {
    let mut consent = Consent::create(request, correlation_id);
    let events = consent.pending_events().to_vec();
    consent_port.save(&consent, events).await?;
    consent.mark_committed();
    Ok(consent)
}

pub async fn authorize_consent(
    consent_port: &dyn ConsentPort,
    consent_id: &str,
    participant_id: &str,
    context: AuthorizeContext,
    correlation_id: &str,
) -> PlatformResult<Consent> {
    let mut consent = consent_port.load(consent_id).await?;
    guard_owned_by(&consent, participant_id)?;
    consent.authorize(context, correlation_id)?;
    let events = consent.pending_events().to_vec();
    consent_port.save(&consent, events).await?;
    consent.mark_committed();
    Ok(consent)
}

pub async fn revoke_consent(
    consent_port: &dyn ConsentPort,
    consent_id: &str,
    participant_id: &str,
    reason: &str,
    correlation_id: &str,
) -> PlatformResult<Consent> {
    let mut consent = consent_port.load(consent_id).await?;
    guard_owned_by(&consent, participant_id)?;
    consent.revoke(participant_id, reason, correlation_id)?;
    let events = consent.pending_events().to_vec();
    consent_port.save(&consent, events).await?;
    consent.mark_committed();
    Ok(consent)
}

pub fn new_consent_id() -> String {
    Uuid::new_v4().to_string()
}

fn guard_owned_by(consent: &Consent, participant_id: &str) -> PlatformResult<()> {
    if consent.participant_id != participant_id {
        Err(PlatformError::authorization("FORBIDDEN", "consent does not belong to this participant"))
    } else {
        Ok(())
    }
}
