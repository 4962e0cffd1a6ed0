use async_trait::async_trait;
use openfinance_core::domain::bulk::{BulkFile, BulkReport};
use openfinance_core::error::PlatformResult;
use openfinance_core::ports::BulkFilePort;
use std::collections::HashMap;
use std::sync::Mutex;

/// Plain mutable-record store for bulk-payment files and their per-row reports
/// (§4.5.2). Not event-sourced — only the `BulkFile`'s own status transitions
/// matter, not a full audit log of intermediate states.
#[derive(Default)]
pub struct InMemoryBulkFiles {
    files: Mutex<HashMap<String, BulkFile>>,
    reports: Mutex<HashMap<String, BulkReport>>,
}

impl InMemoryBulkFiles {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BulkFilePort for InMemoryBulkFiles {
    async fn save_file(&self, file: &BulkFile) -> PlatformResult<()> {
        self.files.lock().unwrap().insert(file.file_id.clone(), file.clone());
        Ok(())
    }

    async fn load_file(&self, file_id: &str) -> PlatformResult<Option<BulkFile>> {
        Ok(self.files.lock().unwrap().get(file_id).cloned())
    }

    async fn save_report(&self, file_id: &str, report: &BulkReport) -> PlatformResult<()> {
        self.reports.lock().unwrap().insert(file_id.to_string(), report.clone());
        Ok(())
    }

    async fn load_report(&self, file_id: &str) -> PlatformResult<Option<BulkReport>> {
        Ok(self.reports.lock().unwrap().get(file_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openfinance_core::domain::bulk::{BulkFileStatus, BulkRowOutcome, IntegrityMode};
    use chrono::Utc;

    fn file() -> BulkFile {
        BulkFile {
            file_id: "f1".to_string(),
            consent_id: "c1".to_string(),
            participant_id: "p1".to_string(),
            integrity_mode: IntegrityMode::BestEffort,
            total_count: 1,
            accepted_count: 1,
            rejected_count: 0,
            total_amount: 10.0,
            status: BulkFileStatus::Processing,
            target_status: BulkFileStatus::Completed,
            polls_observed: 0,
            polls_to_complete: 3,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn round_trips_file_and_report() {
        let store = InMemoryBulkFiles::new();
        store.save_file(&file()).await.unwrap();
        store
            .save_report(
                "f1",
                &BulkReport {
                    file_id: "f1".to_string(),
                    rows: vec![BulkRowOutcome {
                        instruction_id: "I1".to_string(),
                        payee_iban: "DE89370400440532013000".to_string(),
                        amount: 10.0,
                        accepted: true,
                        rejection_reason: None,
                    }],
                },
            )
            .await
            .unwrap();

        assert_eq!(store.load_file("f1").await.unwrap().unwrap().file_id, "f1");
        assert_eq!(store.load_report("f1").await.unwrap().unwrap().rows.len(), 1);
        assert!(store.load_file("missing").await.unwrap().is_none());
    }
}
