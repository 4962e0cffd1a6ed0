//! Collaborator interfaces. The core depends only on these method-sets;
//! concrete wiring happens once, at the composition root.

use crate::domain::ais::{Account, Balance, Transaction};
use crate::domain::bulk::{BulkFile, BulkReport};
use crate::domain::consent::{Consent, ConsentEvent};
use crate::domain::events::OutboxRow;
use crate::domain::fx::{FxDeal, FxQuote};
use crate::domain::participant::ValidationResult;
use crate::domain::saga::SagaState;
use crate::error::PlatformResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Append-only per-aggregate event log with optimistic version control and snapshots (C5).
#[async_trait]
pub trait EventStorePort: Send + Sync {
    /// Append events for `aggregate_id`, enforcing `expected_sequence == last known sequence`.
    /// Fails with `PlatformError::Concurrency` on mismatch.
    async fn append(
        &self,
        aggregate_id: &str,
        expected_sequence: u64,
        events: Vec<ConsentEvent>,
    ) -> PlatformResult<()>;

    /// Load all events for `aggregate_id` with `sequence_number > after_sequence`, in order.
    async fn load_events(
        &self,
        aggregate_id: &str,
        after_sequence: u64,
    ) -> PlatformResult<Vec<ConsentEvent>>;

    async fn last_sequence(&self, aggregate_id: &str) -> PlatformResult<u64>;
}

/// Repository for the Consent aggregate root (C7), rehydrating from the event store (C5).
#[async_trait]
pub trait ConsentPort: Send + Sync {
    async fn load(&self, consent_id: &str) -> PlatformResult<Consent>;
    async fn save(&self, consent: &Consent, new_events: Vec<ConsentEvent>) -> PlatformResult<()>;
}

/// Durable `(idempotencyKey, participantId, requestHash) -> resourceId` mapping with TTL (C3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub idempotency_key: String,
    pub participant_id: String,
    pub request_hash: String,
    pub resource_id: String,
    pub status: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait IdempotencyPort: Send + Sync {
    /// Atomic set-if-absent. Returns `Ok(None)` if this call won the race and stored `record`;
    /// returns `Ok(Some(existing))` if a record for `(idempotency_key, participant_id)` already existed.
    async fn set_if_absent(
        &self,
        record: IdempotencyRecord,
    ) -> PlatformResult<Option<IdempotencyRecord>>;

    async fn get(
        &self,
        idempotency_key: &str,
        participant_id: &str,
    ) -> PlatformResult<Option<IdempotencyRecord>>;
}

/// TTL-bounded key/value store for hot reads (C4).
#[async_trait]
pub trait CachePort: Send + Sync {
    async fn get(&self, key: &str) -> PlatformResult<Option<String>>;
    async fn put(&self, key: &str, value: String, ttl: chrono::Duration) -> PlatformResult<()>;
    async fn set_if_absent(&self, key: &str, value: String, ttl: chrono::Duration) -> PlatformResult<bool>;
}

/// Cached lookup/validation of TPP legal identity against the trust framework (C2).
#[async_trait]
pub trait DirectoryPort: Send + Sync {
    async fn validate(&self, participant_id: &str, now: DateTime<Utc>) -> PlatformResult<ValidationResult>;
}

/// FX market rate lookup. `None` means the market is closed for the pair.
#[async_trait]
pub trait RatePort: Send + Sync {
    async fn rate(&self, source_currency: &str, target_currency: &str) -> PlatformResult<Option<f64>>;
}

/// Publishes domain events to the bus. Subscribers MUST be idempotent on
/// `(aggregate_id, sequence_number)`; redelivery on crash is permitted.
#[async_trait]
pub trait BusPort: Send + Sync {
    async fn publish(&self, event: ConsentEvent) -> PlatformResult<()>;
}

/// Public key material for verifying a JWT issued by `issuer` under `kid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKeyMaterial {
    /// JWS alg, e.g. "RS256", "ES256".
    pub algorithm: String,
    pub public_key_pem: String,
}

/// Resolves signing keys for access-token verification (C8 step 3). Implementations
/// fetch and cache the authorization server's JWKS (cached >= 5 min, refetched on
/// unknown `kid`); the cache policy lives at the adapter, not here.
#[async_trait]
pub trait JwksPort: Send + Sync {
    async fn signing_key(&self, issuer: &str, kid: &str) -> PlatformResult<SigningKeyMaterial>;
}

/// Read-only access to the core banking ledger behind Account Information Services
/// (§4.5.1). Accounts/balances/transactions are not part of the platform's own
/// event-sourced data model; they are fetched from the bank's ledger of record.
#[async_trait]
pub trait AccountsPort: Send + Sync {
    async fn list_accounts(&self, participant_id: &str, customer_id: &str) -> PlatformResult<Vec<Account>>;

    async fn get_account(&self, account_id: &str) -> PlatformResult<Option<Account>>;

    async fn get_balances(&self, account_id: &str) -> PlatformResult<Vec<Balance>>;

    async fn get_transactions(
        &self,
        account_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> PlatformResult<Vec<Transaction>>;
}

/// Persistence for the bulk-payment file record and its per-row report (§4.5.2).
/// Plain mutable records, not event-sourced.
#[async_trait]
pub trait BulkFilePort: Send + Sync {
    async fn save_file(&self, file: &BulkFile) -> PlatformResult<()>;
    async fn load_file(&self, file_id: &str) -> PlatformResult<Option<BulkFile>>;
    async fn save_report(&self, file_id: &str, report: &BulkReport) -> PlatformResult<()>;
    async fn load_report(&self, file_id: &str) -> PlatformResult<Option<BulkReport>>;
}

/// Persistence for FX quotes and booked deals (§4.5.3). Plain mutable records.
#[async_trait]
pub trait FxPort: Send + Sync {
    async fn save_quote(&self, quote: &FxQuote) -> PlatformResult<()>;
    async fn load_quote(&self, quote_id: &str) -> PlatformResult<Option<FxQuote>>;
    async fn save_deal(&self, deal: &FxDeal) -> PlatformResult<()>;
    async fn load_deal(&self, deal_id: &str) -> PlatformResult<Option<FxDeal>>;
}

/// Durable saga instance storage (C11). Every state transition is persisted before
/// the orchestrator invokes the next effect (§5 durability requirement).
#[async_trait]
pub trait SagaStorePort: Send + Sync {
    async fn save(&self, saga: &SagaState) -> PlatformResult<()>;
    async fn load(&self, saga_id: &str) -> PlatformResult<Option<SagaState>>;
    async fn load_in_progress(&self) -> PlatformResult<Vec<SagaState>>;
}

/// Transactional outbox storage (C12). `append` is written in the same local
/// transaction as the event-store append it mirrors; the dispatcher only reads/marks.
#[async_trait]
pub trait OutboxPort: Send + Sync {
    async fn append(&self, row: OutboxRow) -> PlatformResult<()>;

    /// Pending rows for one aggregate, in sequence order.
    async fn pending_for_aggregate(&self, aggregate_id: &str) -> PlatformResult<Vec<OutboxRow>>;

    /// Every aggregate with at least one pending row, used to fan the dispatcher out.
    async fn aggregates_with_pending_rows(&self) -> PlatformResult<Vec<String>>;

    async fn mark_dispatched(&self, row_id: &str) -> PlatformResult<()>;
}
