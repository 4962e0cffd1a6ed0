use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    InProgress,
    Compensating,
    Completed,
    Compensated,
    CompensationFailed,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Compensated,
    CompensationFailed,
}

/// Failure taxonomy returned by a step implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFailureKind {
    Transient,
    Permanent,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaStepState {
    pub step_id: String,
    pub step_name: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error_code: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl SagaStepState {
    fn pending(saga_id: &str, step_name: &str) -> Self {
        Self {
            step_id: format!("{saga_id}:{step_name}"),
            step_name: step_name.to_string(),
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            failed_at: None,
            error_code: None,
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaState {
    pub saga_id: String,
    pub saga_type: String,
    pub current_step: usize,
    pub status: SagaStatus,
    pub steps: Vec<SagaStepState>,
    pub saga_data: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub timeout_at: DateTime<Utc>,
    pub error_details: Option<String>,
}

impl SagaState {
    pub fn new(
        saga_id: impl Into<String>,
        saga_type: impl Into<String>,
        step_names: &[&str],
        saga_data: serde_json::Value,
        timeout_at: DateTime<Utc>,
    ) -> Self {
        let saga_id = saga_id.into();
        let now = Utc::now();
        Self {
            steps: step_names.iter().map(|name| SagaStepState::pending(&saga_id, name)).collect(),
            saga_id,
            saga_type: saga_type.into(),
            current_step: 0,
            status: SagaStatus::InProgress,
            saga_data,
            started_at: now,
            updated_at: now,
            timeout_at,
            error_details: None,
        }
    }

    pub fn step_id_for(&self, step_name: &str) -> String {
        format!("{}:{}", self.saga_id, step_name)
    }

    pub fn mark_step_running(&mut self, index: usize) {
        self.steps[index].status = StepStatus::Running;
        self.steps[index].started_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    pub fn mark_step_completed(&mut self, index: usize) {
        self.steps[index].status = StepStatus::Completed;
        self.steps[index].completed_at = Some(Utc::now());
        self.current_step = index + 1;
        self.updated_at = Utc::now();
    }

    pub fn mark_step_failed(&mut self, index: usize, error_code: impl Into<String>) {
        self.steps[index].status = StepStatus::Failed;
        self.steps[index].failed_at = Some(Utc::now());
        self.steps[index].error_code = Some(error_code.into());
        self.status = SagaStatus::Compensating;
        self.updated_at = Utc::now();
    }

    pub fn begin_timeout_compensation(&mut self) {
        self.status = SagaStatus::TimedOut;
        self.updated_at = Utc::now();
        self.status = SagaStatus::Compensating;
    }

    /// Indices of steps already COMPLETED, in reverse (compensation) order.
    pub fn completed_steps_reverse(&self) -> Vec<usize> {
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, step)| step.status == StepStatus::Completed)
            .map(|(index, _)| index)
            .rev()
            .collect()
    }

    pub fn mark_step_compensated(&mut self, index: usize) {
        self.steps[index].status = StepStatus::Compensated;
        self.updated_at = Utc::now();
    }

    pub fn mark_step_compensation_failed(&mut self, index: usize, error_code: impl Into<String>) {
        self.steps[index].status = StepStatus::CompensationFailed;
        self.steps[index].error_code = Some(error_code.into());
        self.updated_at = Utc::now();
    }

    /// Finalize after a compensation pass: COMPENSATED if every previously-completed
    /// step is now COMPENSATED, COMPENSATION_FAILED if any compensation failed.
    pub fn finalize_after_compensation(&mut self) {
        let any_failed = self.steps.iter().any(|s| s.status == StepStatus::CompensationFailed);
        self.status = if any_failed { SagaStatus::CompensationFailed } else { SagaStatus::Compensated };
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self) {
        self.status = SagaStatus::Completed;
        self.updated_at = Utc::now();
    }

    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        self.status == SagaStatus::InProgress && now >= self.timeout_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compensation_order_is_reverse_of_completion() {
        let mut saga = SagaState::new(
            "saga-1",
            "LoanCreation",
            &["validateCustomer", "reserveCredit", "createLoan"],
            serde_json::json!({}),
            Utc::now() + chrono::Duration::minutes(5),
        );
        saga.mark_step_running(0);
        saga.mark_step_completed(0);
        saga.mark_step_running(1);
        saga.mark_step_completed(1);
        saga.mark_step_running(2);
        saga.mark_step_failed(2, "PERMANENT");

        assert_eq!(saga.status, SagaStatus::Compensating);
        assert_eq!(saga.completed_steps_reverse(), vec![1, 0]);

        saga.mark_step_compensated(1);
        saga.mark_step_compensated(0);
        saga.finalize_after_compensation();
        assert_eq!(saga.status, SagaStatus::Compensated);
    }

    #[test]
    fn continues_compensating_after_one_compensation_fails() {
        let mut saga = SagaState::new(
            "saga-2",
            "LoanCreation",
            &["stepA", "stepB", "stepC"],
            serde_json::json!({}),
            Utc::now() + chrono::Duration::minutes(5),
        );
        for i in 0..3 {
            saga.mark_step_running(i);
            saga.mark_step_completed(i);
        }
        saga.status = SagaStatus::Compensating;

        saga.mark_step_compensation_failed(2, "COMPENSATION_TRANSIENT_FAILURE");
        saga.mark_step_compensated(1);
        saga.mark_step_compensated(0);
        saga.finalize_after_compensation();

        assert_eq!(saga.status, SagaStatus::CompensationFailed);
        assert_eq!(saga.steps[1].status, StepStatus::Compensated);
        assert_eq!(saga.steps[0].status, StepStatus::Compensated);
    }
}
