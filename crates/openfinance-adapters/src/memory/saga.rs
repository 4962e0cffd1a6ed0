use async_trait::async_trait;
use openfinance_core::domain::saga::{SagaState, SagaStatus};
use openfinance_core::error::PlatformResult;
use openfinance_core::ports::SagaStorePort;
use std::collections::HashMap;
use std::sync::Mutex;

/// Durable saga-instance storage (C11). Every state transition the orchestrator
/// produces is written here before the next effect runs (§5 durability rule).
#[derive(Default)]
pub struct InMemorySagaStore {
    sagas: Mutex<HashMap<String, SagaState>>,
}

impl InMemorySagaStore {
    pub fn new() -> Self {
        Self::default()
    }
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
            .filter(|saga| saga.status == SagaStatus::InProgress)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn load_in_progress_excludes_terminal_sagas() {
        let store = InMemorySagaStore::new();
        let in_progress = SagaState::new("s1", "LoanCreation", &["a"], serde_json::json!({}), Utc::now() + chrono::Duration::minutes(5));
        let mut completed = SagaState::new("s2", "LoanCreation", &["a"], serde_json::json!({}), Utc::now() + chrono::Duration::minutes(5));
        completed.mark_completed();

        store.save(&in_progress).await.unwrap();
        store.save(&completed).await.unwrap();

        let loaded = store.load_in_progress().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].saga_id, "s1");
    }
}
