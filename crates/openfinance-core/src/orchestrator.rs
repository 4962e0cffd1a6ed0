//! Saga Orchestrator (C11, §4.6): drives multi-step operations with exactly-one
//! forward attempt per step and bounded compensation on permanent failure.

use crate::domain::saga::{SagaState, SagaStatus, StepFailureKind};
use crate::error::{PlatformError, PlatformResult};
use crate::ports::SagaStorePort;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// One step of a saga: a forward action and its compensation. A returned `Err`
/// is permanent unless tagged `StepFailureKind::Transient` — retries on transient
/// errors are the orchestrator's responsibility, not the step's.
#[async_trait]
pub trait SagaStep: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(&self, saga: &SagaState) -> Result<(), (StepFailureKind, String)>;
    async fn compensate(&self, saga: &SagaState) -> Result<(), String>;
}

pub struct SagaOrchestrator {
    store: Arc<dyn SagaStorePort>,
    registry: HashMap<String, Vec<Arc<dyn SagaStep>>>,
    max_transient_retries: u32,
}

impl SagaOrchestrator {
    pub fn new(store: Arc<dyn SagaStorePort>, max_transient_retries: u32) -> Self {
        Self { store, registry: HashMap::new(), max_transient_retries }
    }

    /// Register the step sequence for a saga type. Must be called before any
    /// saga of that type is started or resumed.
    pub fn register(&mut self, saga_type: impl Into<String>, steps: Vec<Arc<dyn SagaStep>>) {
        self.registry.insert(saga_type.into(), steps);
    }

    fn steps_for(&self, saga_type: &str) -> PlatformResult<&[Arc<dyn SagaStep>]> {
        self.registry
            .get(saga_type)
            .map(|steps| steps.as_slice())
            .ok_or_else(|| PlatformError::fatal(format!("no steps registered for saga type '{saga_type}'")))
    }

    pub async fn start(
        &self,
        saga_id: impl Into<String>,
        saga_type: &str,
        saga_data: serde_json::Value,
        timeout_at: DateTime<Utc>,
    ) -> PlatformResult<SagaState> {
        let steps = self.steps_for(saga_type)?;
        let step_names: Vec<&str> = steps.iter().map(|step| step.name()).collect();
        let mut saga = SagaState::new(saga_id, saga_type, &step_names, saga_data, timeout_at);
        self.store.save(&saga).await?;
        self.drive(&mut saga).await?;
        Ok(saga)
    }

    /// Resume a persisted saga from `current_step`, a no-op for already-terminal sagas.
    pub async fn resume(&self, saga_id: &str) -> PlatformResult<SagaState> {
        let mut saga = self
            .store
            .load(saga_id)
            .await?
            .ok_or_else(|| PlatformError::not_found(format!("saga '{saga_id}' not found")))?;
        if saga.status == SagaStatus::InProgress {
            self.drive(&mut saga).await?;
        } else if saga.status == SagaStatus::Compensating {
            self.compensate(&mut saga).await?;
        }
        Ok(saga)
    }

    async fn drive(&self, saga: &mut SagaState) -> PlatformResult<()> {
        let steps = self.steps_for(&saga.saga_type)?;
        while saga.status == SagaStatus::InProgress && saga.current_step < steps.len() {
            let index = saga.current_step;
            saga.mark_step_running(index);
            self.store.save(saga).await?;

            let mut attempts = 0u32;
            loop {
                match steps[index].execute(saga).await {
                    Ok(()) => {
                        saga.mark_step_completed(index);
                        self.store.save(saga).await?;
                        break;
                    }
                    Err((StepFailureKind::Transient, _)) if attempts < self.max_transient_retries => {
                        attempts += 1;
                    }
                    Err((_kind, message)) => {
                        saga.mark_step_failed(index, message);
                        self.store.save(saga).await?;
                        self.compensate(saga).await?;
                        return Ok(());
                    }
                }
            }
        }

        if saga.status == SagaStatus::InProgress {
            saga.mark_completed();
            self.store.save(saga).await?;
        }
        Ok(())
    }

    /// Walk COMPLETED steps in reverse, invoking each compensation. A compensation
    /// failure does not abort the walk — every previously-completed step is still
    /// given a chance to compensate.
    async fn compensate(&self, saga: &mut SagaState) -> PlatformResult<()> {
        let steps = self.steps_for(&saga.saga_type)?;
        for index in saga.completed_steps_reverse() {
            match steps[index].compensate(saga).await {
                Ok(()) => saga.mark_step_compensated(index),
                Err(error_code) => saga.mark_step_compensation_failed(index, error_code),
            }
            self.store.save(saga).await?;
        }
        saga.finalize_after_compensation();
        self.store.save(saga).await?;
        Ok(())
    }

    /// Timeout monitor tick (semantic 4): any IN_PROGRESS saga past `timeoutAt`
    /// transitions to TIMED_OUT and immediately begins compensation.
    pub async fn run_timeout_sweep(&self, now: DateTime<Utc>) -> PlatformResult<Vec<String>> {
        let mut timed_out = Vec::new();
        for mut saga in self.store.load_in_progress().await? {
            if saga.is_timed_out(now) {
                saga.begin_timeout_compensation();
                self.store.save(&saga).await?;
                self.compensate(&mut saga).await?;
                timed_out.push(saga.saga_id.clone());
            }
        }
        Ok(timed_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemorySagaStore {
        sagas: Mutex<HashMap<String, SagaState>>,
    }

    #[async_trait]
    impl SagaStorePort for InMemorySagaStore {
        async fn save(&self, saga: &SagaState) -> PlatformResult<()> {
            self.sagas.lock().unwrap().insert(saga.saga_id.clone(), saga.clone());
            Ok(())
        }
        async fn load(&self, saga_id: &str) -> PlatformResult<Option<SagaState>> {
            Ok(self.sagas.lock().unwrap().get(saga_id).cloned())
        }
        async fn load_in_progress(&self) -> PlatformResult<Vec<SagaState>> {
            Ok(self
                .sagas
                .lock()
                .unwrap()
                .values()
                .filter(|s| s.status == SagaStatus::InProgress)
                .cloned()
                .collect())
        }
    }

    struct AlwaysSucceeds(&'static str);

    #[async_trait]
    impl SagaStep for AlwaysSucceeds {
        fn name(&self) -> &str {
            self.0
        }
        async fn execute(&self, _saga: &SagaState) -> Result<(), (StepFailureKind, String)> {
            Ok(())
        }
        async fn compensate(&self, _saga: &SagaState) -> Result<(), String> {
            Ok(())
        }
    }

    struct AlwaysFailsPermanently(&'static str);

    #[async_trait]
    impl SagaStep for AlwaysFailsPermanently {
        fn name(&self) -> &str {
            self.0
        }
        async fn execute(&self, _saga: &SagaState) -> Result<(), (StepFailureKind, String)> {
            Err((StepFailureKind::Permanent, "boom".to_string()))
        }
        async fn compensate(&self, _saga: &SagaState) -> Result<(), String> {
            Ok(())
        }
    }

    struct CompensationFails(&'static str);

    #[async_trait]
    impl SagaStep for CompensationFails {
        fn name(&self) -> &str {
            self.0
        }
        async fn execute(&self, _saga: &SagaState) -> Result<(), (StepFailureKind, String)> {
            Ok(())
        }
        async fn compensate(&self, _saga: &SagaState) -> Result<(), String> {
            Err("COMPENSATION_TRANSIENT_FAILURE".to_string())
        }
    }

    #[tokio::test]
    async fn all_steps_succeed_completes_saga() {
        let store = Arc::new(InMemorySagaStore::default());
        let mut orchestrator = SagaOrchestrator::new(store, 3);
        orchestrator.register(
            "LoanCreation",
            vec![Arc::new(AlwaysSucceeds("validateCustomer")), Arc::new(AlwaysSucceeds("reserveCredit"))],
        );

        let saga = orchestrator
            .start("saga-1", "LoanCreation", serde_json::json!({}), Utc::now() + chrono::Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(saga.status, SagaStatus::Completed);
        assert!(saga.steps.iter().all(|s| s.status == crate::domain::saga::StepStatus::Completed));
    }

    #[tokio::test]
    async fn permanent_failure_compensates_completed_steps_in_reverse() {
        let store = Arc::new(InMemorySagaStore::default());
        let mut orchestrator = SagaOrchestrator::new(store, 3);
        orchestrator.register(
            "LoanCreation",
            vec![
                Arc::new(AlwaysSucceeds("validateCustomer")),
                Arc::new(AlwaysSucceeds("reserveCredit")),
                Arc::new(AlwaysFailsPermanently("createLoan")),
            ],
        );

        let saga = orchestrator
            .start("saga-2", "LoanCreation", serde_json::json!({}), Utc::now() + chrono::Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(saga.status, SagaStatus::Compensated);
        assert_eq!(saga.steps[0].status, crate::domain::saga::StepStatus::Compensated);
        assert_eq!(saga.steps[1].status, crate::domain::saga::StepStatus::Compensated);
    }

    #[tokio::test]
    async fn compensation_failure_still_compensates_earlier_steps() {
        let store = Arc::new(InMemorySagaStore::default());
        let mut orchestrator = SagaOrchestrator::new(store, 3);
        orchestrator.register(
            "LoanCreation",
            vec![
                Arc::new(AlwaysSucceeds("validateCustomer")),
                Arc::new(CompensationFails("reserveCredit")),
                Arc::new(AlwaysFailsPermanently("createLoan")),
            ],
        );

        let saga = orchestrator
            .start("saga-3", "LoanCreation", serde_json::json!({}), Utc::now() + chrono::Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(saga.status, SagaStatus::CompensationFailed);
        assert_eq!(saga.steps[0].status, crate::domain::saga::StepStatus::Compensated);
        assert_eq!(saga.steps[1].status, crate::domain::saga::StepStatus::CompensationFailed);
    }

    #[tokio::test]
    async fn timeout_sweep_compensates_overdue_in_progress_sagas() {
        let store = Arc::new(InMemorySagaStore::default());
        let mut orchestrator = SagaOrchestrator::new(store.clone(), 3);
        orchestrator.register("LoanCreation", vec![Arc::new(AlwaysSucceeds("validateCustomer"))]);

        let mut stuck = SagaState::new(
            "saga-4",
            "LoanCreation",
            &["validateCustomer"],
            serde_json::json!({}),
            Utc::now() - chrono::Duration::seconds(1),
        );
        stuck.mark_step_running(0);
        store.save(&stuck).await.unwrap();

        let timed_out = orchestrator.run_timeout_sweep(Utc::now()).await.unwrap();
        assert_eq!(timed_out, vec!["saga-4".to_string()]);

        let saga = store.load("saga-4").await.unwrap().unwrap();
        assert_eq!(saga.status, SagaStatus::Compensated);
    }
}
