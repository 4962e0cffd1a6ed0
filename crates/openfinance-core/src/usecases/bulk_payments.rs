//! Bulk Payments (C10.2, §4.5.2).

use crate::domain::bulk::{evaluate_csv, BulkFile, BulkFileStatus, BulkReport, IntegrityMode};
use crate::domain::events::DomainEvent;
use crate::error::{PlatformError, PlatformResult};
use crate::ports::{BulkFilePort, BusPort, CachePort, ConsentPort, IdempotencyPort, IdempotencyRecord};
use crate::security::crypto::sha256_hex;
use crate::settings::PlatformSettings;
use crate::usecases::{check_idempotency, load_authorized_consent};
use chrono::{DateTime, Utc};

pub const SCOPE_BULK_PAYMENT: &str = "bulk-payment";

#[allow(clippy::too_many_arguments)]
pub async fn submit_file(
    consent_port: &dyn ConsentPort,
    bulk_port: &dyn BulkFilePort,
    idempotency_port: &dyn IdempotencyPort,
    bus: &dyn BusPort,
    file_id: &str,
    consent_id: &str,
    participant_id: &str,
    idempotency_key: &str,
    request_hash: &str,
    file_name: &str,
    integrity_mode: IntegrityMode,
    file_content: &str,
    file_hash: &str,
    settings: &PlatformSettings,
    now: DateTime<Utc>,
) -> PlatformResult<BulkFile> {
    load_authorized_consent(consent_port, consent_id, participant_id, SCOPE_BULK_PAYMENT, now).await?;

    if let Some(existing) =
        check_idempotency(idempotency_port, idempotency_key, participant_id, request_hash).await?
    {
        return bulk_port
            .load_file(&existing.resource_id)
            .await?
            .ok_or_else(|| PlatformError::fatal("idempotency record references a missing bulk file"));
    }

    if file_content.is_empty() {
        return Err(PlatformError::validation("SCHEMA_VALIDATION_FAILED", "fileContent must not be empty"));
    }
    if file_content.len() as u64 > settings.bulk_max_file_size_bytes {
        return Err(PlatformError::validation("SCHEMA_VALIDATION_FAILED", "fileContent exceeds maxFileSizeBytes"));
    }
    if sha256_hex(file_content.as_bytes()) != file_hash {
        return Err(PlatformError::validation("INTEGRITY_FAILURE", "fileHash does not match SHA-256(fileContent)"));
    }

    let evaluated = evaluate_csv(file_content, integrity_mode)?;
    let file_id = file_id.to_string();

    let file = BulkFile {
        file_id: file_id.clone(),
        consent_id: consent_id.to_string(),
        participant_id: participant_id.to_string(),
        integrity_mode,
        total_count: evaluated.rows.len() as u32,
        accepted_count: evaluated.accepted_count,
        rejected_count: evaluated.rejected_count,
        total_amount: evaluated.total_amount,
        status: BulkFileStatus::Processing,
        target_status: evaluated.target_status,
        polls_observed: 0,
        polls_to_complete: settings.bulk_status_polls_to_complete,
        created_at: now,
    };
    bulk_port.save_file(&file).await?;
    bulk_port.save_report(&file_id, &BulkReport { file_id: file_id.clone(), rows: evaluated.rows }).await?;

    idempotency_port
        .set_if_absent(IdempotencyRecord {
            idempotency_key: idempotency_key.to_string(),
            participant_id: participant_id.to_string(),
            request_hash: request_hash.to_string(),
            resource_id: file_id.clone(),
            status: "PROCESSING".to_string(),
            expires_at: now + chrono::Duration::seconds(settings.idempotency_default_ttl_seconds),
        })
        .await?;

    bus.publish(DomainEvent::new(
        file_id.clone(),
        "BulkFile",
        1,
        "BulkFileSubmittedEvent",
        1,
        consent_id,
        None,
        serde_json::json!({
            "participantId": participant_id,
            "fileName": file_name,
            "targetStatus": file.target_status,
        }),
    ))
    .await?;

    Ok(file)
}

/// Advances the PROCESSING file one poll toward its target status (simulated async
/// settlement). Returns the updated file alongside whether this call is the one that
/// carried it from PROCESSING into a terminal status, so callers can release admission
/// slots (C9) exactly once per file.
pub async fn get_file_status(bulk_port: &dyn BulkFilePort, file_id: &str) -> PlatformResult<(BulkFile, bool)> {
    let mut file = bulk_port
        .load_file(file_id)
        .await?
        .ok_or_else(|| PlatformError::not_found(format!("bulk file '{file_id}' not found")))?;
    let was_terminal = file.status.is_terminal();
    file.observe_poll();
    bulk_port.save_file(&file).await?;
    let just_completed = !was_terminal && file.status.is_terminal();
    Ok((file, just_completed))
}

/// Cache-through per-row report lookup.
pub async fn get_file_report(
    cache: &dyn CachePort,
    bulk_port: &dyn BulkFilePort,
    participant_id: &str,
    file_id: &str,
) -> PlatformResult<BulkReport> {
    let cache_key = format!("bulk-report:{participant_id}:{file_id}");
    if let Some(cached) = cache.get(&cache_key).await? {
        if let Ok(report) = serde_json::from_str::<BulkReport>(&cached) {
            return Ok(report);
        }
    }

    let report = bulk_port
        .load_report(file_id)
        .await?
        .ok_or_else(|| PlatformError::not_found(format!("bulk report for file '{file_id}' not found")))?;
    let serialized =
        serde_json::to_string(&report).map_err(|e| PlatformError::fatal(format!("failed to serialize report: {e}")))?;
    cache.put(&cache_key, serialized, chrono::Duration::seconds(300)).await?;
    Ok(report)
}
