use crate::error::{PlatformError, PlatformResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrityMode {
    BestEffort,
    FullRejection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkFileStatus {
    Processing,
    Completed,
    PartiallyAccepted,
    Rejected,
}

impl BulkFileStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkRowOutcome {
    pub instruction_id: String,
    pub payee_iban: String,
    pub amount: f64,
    pub accepted: bool,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkFile {
    pub file_id: String,
    pub consent_id: String,
    pub participant_id: String,
    pub integrity_mode: IntegrityMode,
    pub total_count: u32,
    pub accepted_count: u32,
    pub rejected_count: u32,
    pub total_amount: f64,
    pub status: BulkFileStatus,
    pub target_status: BulkFileStatus,
    pub polls_observed: u32,
    pub polls_to_complete: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkReport {
    pub file_id: String,
    pub rows: Vec<BulkRowOutcome>,
}

/// Structural IBAN check: 2 letters + 2 digits + alphanumeric remainder, length 15-34.
pub fn is_structurally_valid_iban(iban: &str) -> bool {
    let chars: Vec<char> = iban.chars().collect();
    if chars.len() < 15 || chars.len() > 34 {
        return false;
    }
    if !chars[0].is_ascii_alphabetic() || !chars[1].is_ascii_alphabetic() {
        return false;
    }
    if !chars[2].is_ascii_digit() || !chars[3].is_ascii_digit() {
        return false;
    }
    chars.iter().all(|c| c.is_ascii_alphanumeric())
}

/// Parsed CSV row prior to IBAN/amount evaluation.
struct RawRow {
    instruction_id: String,
    payee_iban: String,
    amount: f64,
}

/// Parse the bulk-payments CSV per §6.2: header `instruction_id,payee_iban,amount`
/// (case-insensitive), three non-empty columns per row, amount a non-negative decimal,
/// trailing `\r` tolerated.
fn parse_csv(content: &str) -> PlatformResult<Vec<RawRow>> {
    let mut lines = content.lines();
    let header = lines.next().ok_or_else(|| {
        PlatformError::validation("SCHEMA_VALIDATION_FAILED", "bulk file is empty")
    })?;
    let header = header.trim_end_matches('\r');
    if !header.eq_ignore_ascii_case("instruction_id,payee_iban,amount") {
        return Err(PlatformError::validation(
            "SCHEMA_VALIDATION_FAILED",
            format!("unexpected CSV header: '{header}'"),
        ));
    }

    let mut rows = Vec::new();
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let columns: Vec<&str> = line.split(',').collect();
        if columns.len() != 3 || columns.iter().any(|c| c.trim().is_empty()) {
            return Err(PlatformError::validation(
                "SCHEMA_VALIDATION_FAILED",
                format!("malformed CSV row: '{line}'"),
            ));
        }

        let amount: f64 = columns[2].trim().parse().map_err(|_| {
            PlatformError::validation(
                "SCHEMA_VALIDATION_FAILED",
                format!("amount is not a decimal: '{}'", columns[2]),
            )
        })?;
        if amount <= 0.0 {
            return Err(PlatformError::validation(
                "SCHEMA_VALIDATION_FAILED",
                format!("amount must be > 0, got {amount}"),
            ));
        }

        rows.push(RawRow {
            instruction_id: columns[0].trim().to_string(),
            payee_iban: columns[1].trim().to_string(),
            amount,
        });
    }

    Ok(rows)
}

#[derive(Debug)]
pub struct EvaluatedFile {
    pub rows: Vec<BulkRowOutcome>,
    pub accepted_count: u32,
    pub rejected_count: u32,
    pub total_amount: f64,
    pub target_status: BulkFileStatus,
}

/// Evaluate CSV content into per-row outcomes and a derived target status.
pub fn evaluate_csv(content: &str, integrity_mode: IntegrityMode) -> PlatformResult<EvaluatedFile> {
    let raw_rows = parse_csv(content)?;

    let mut rows: Vec<BulkRowOutcome> = raw_rows
        .into_iter()
        .map(|row| {
            let valid_iban = is_structurally_valid_iban(&row.payee_iban);
            BulkRowOutcome {
                instruction_id: row.instruction_id,
                payee_iban: row.payee_iban,
                amount: row.amount,
                accepted: valid_iban,
                rejection_reason: if valid_iban { None } else { Some("Invalid IBAN".to_string()) },
            }
        })
        .collect();

    let mut accepted_count = rows.iter().filter(|r| r.accepted).count() as u32;
    let mut rejected_count = rows.len() as u32 - accepted_count;

    let target_status = if rejected_count == 0 {
        BulkFileStatus::Completed
    } else if accepted_count == 0 {
        BulkFileStatus::Rejected
    } else {
        BulkFileStatus::PartiallyAccepted
    };

    let target_status = if integrity_mode == IntegrityMode::FullRejection && rejected_count > 0 {
        for row in rows.iter_mut() {
            if row.accepted {
                row.accepted = false;
                row.rejection_reason = Some("Full-rejection mode: file rejected".to_string());
            }
        }
        accepted_count = 0;
        rejected_count = rows.len() as u32;
        BulkFileStatus::Rejected
    } else {
        target_status
    };

    let total_amount = rows.iter().filter(|r| r.accepted).map(|r| r.amount).sum();

    Ok(EvaluatedFile { rows, accepted_count, rejected_count, total_amount, target_status })
}

impl BulkFile {
    /// Advance a PROCESSING file one poll toward `target_status`, completing it
    /// once `polls_to_complete` observations have elapsed. Terminal statuses are immutable.
    pub fn observe_poll(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.polls_observed += 1;
        if self.polls_observed >= self.polls_to_complete {
            self.status = self.target_status;
        }
    }
}
