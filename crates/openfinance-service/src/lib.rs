//! HTTP surface and composition root (§6.1). Wires the port traits in
//! `openfinance_core::ports` to concrete adapters and exposes them behind
//! axum handlers that enforce the FAPI 2.0 security envelope and admission
//! control before ever touching a use case.

#![deny(unsafe_code)]

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use openfinance_adapters::memory::{
    EventSourcedConsentRepository, InMemoryAccounts, InMemoryBulkFiles, InMemoryBus, InMemoryCache,
    InMemoryDirectory, InMemoryEventStore, InMemoryFx, InMemoryIdempotency, InMemoryJwks, InMemoryKeyStore,
    InMemoryOutbox, InMemoryRates, InMemorySagaStore,
};
use openfinance_adapters::postgres::{PostgresEventStore, PostgresStorageConfig};
use openfinance_core::domain::ais::{Balance, TransactionPage};
use openfinance_core::domain::bulk::{BulkFile, BulkReport, IntegrityMode};
use openfinance_core::domain::consent::{AuthorizeContext, Consent, ConsentStatus, CreateConsentRequest};
use openfinance_core::domain::fx::{FxDeal, FxQuote};
use openfinance_core::error::PlatformError;
use openfinance_core::key_store::{get_secret_metadata, store_secret, KeyStorePort, SecretMetadata};
use openfinance_core::ports::{
    AccountsPort, BulkFilePort, BusPort, CachePort, ConsentPort, DirectoryPort, EventStorePort, FxPort,
    IdempotencyPort, JwksPort, OutboxPort, RatePort, SagaStorePort,
};
use openfinance_core::security::crypto::sha256_hex;
use openfinance_core::settings::PlatformSettings;
use openfinance_core::usecases::{ais, bulk_payments, consent as consent_usecases, fx};
use openfinance_core::{FapiSecurityEnvelope, InboundRequest, Principal, RateLimitOutcome, RateLimiter, ScopeClass};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const SCOPE_INTERNAL_SECRETS: &str = "internal:secrets";

/// Where the durable event store and outbox live. Every other port stays
/// in-memory regardless of this choice; see DESIGN.md for the scope decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub pg_max_connections: u32,
    pub settings: PlatformSettings,
    /// `aud` claim the security envelope requires on every access token.
    pub expected_audience: String,
    /// Used to reconstruct the absolute URL a DPoP proof's `htu` claim was bound to.
    pub public_base_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::Memory,
            database_url: None,
            pg_max_connections: 5,
            settings: PlatformSettings::default(),
            expected_audience: "https://openfinance.example/resource".to_string(),
            public_base_url: "https://openfinance.example".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("storage = postgres requires a database_url")]
    MissingDatabaseUrl,
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Everything a handler needs, composed once at startup and shared behind `Arc`s.
#[derive(Clone)]
pub struct ServiceState {
    pub settings: PlatformSettings,
    pub public_base_url: String,
    pub security: Arc<FapiSecurityEnvelope>,
    pub rate_limiter: Arc<RateLimiter>,
    pub event_store: Arc<dyn EventStorePort>,
    pub outbox: Arc<dyn OutboxPort>,
    pub consent_port: Arc<dyn ConsentPort>,
    pub idempotency: Arc<dyn IdempotencyPort>,
    pub cache: Arc<dyn CachePort>,
    pub directory: Arc<dyn DirectoryPort>,
    pub rates: Arc<dyn RatePort>,
    pub bus: Arc<dyn BusPort>,
    pub jwks: Arc<dyn JwksPort>,
    pub accounts: Arc<dyn AccountsPort>,
    pub bulk_files: Arc<dyn BulkFilePort>,
    pub fx: Arc<dyn FxPort>,
    pub sagas: Arc<dyn SagaStorePort>,
    pub key_store: Arc<dyn KeyStorePort>,
}

impl ServiceState {
    pub async fn bootstrap(config: ServiceConfig) -> Result<Self, BootstrapError> {
        let (event_store, outbox): (Arc<dyn EventStorePort>, Arc<dyn OutboxPort>) = match config.storage {
            StorageBackend::Memory => (Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryOutbox::new())),
            StorageBackend::Postgres => {
                let database_url = config.database_url.clone().ok_or(BootstrapError::MissingDatabaseUrl)?;
                let store = Arc::new(
                    PostgresEventStore::connect(PostgresStorageConfig::new(database_url, config.pg_max_connections))
                        .await?,
                );
                (store.clone(), store)
            }
        };

        let consent_port: Arc<dyn ConsentPort> =
            Arc::new(EventSourcedConsentRepository::new(event_store.clone(), outbox.clone()));
        let security = Arc::new(FapiSecurityEnvelope::new(config.settings.clone(), config.expected_audience.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(&config.settings));

        Ok(Self {
            settings: config.settings,
            public_base_url: config.public_base_url,
            security,
            rate_limiter,
            event_store,
            outbox,
            consent_port,
            idempotency: Arc::new(InMemoryIdempotency::new()),
            cache: Arc::new(InMemoryCache::new()),
            directory: Arc::new(InMemoryDirectory::new()),
            rates: Arc::new(InMemoryRates::new()),
            bus: Arc::new(InMemoryBus::new()),
            jwks: Arc::new(InMemoryJwks::new()),
            accounts: Arc::new(InMemoryAccounts::new()),
            bulk_files: Arc::new(InMemoryBulkFiles::new()),
            fx: Arc::new(InMemoryFx::new()),
            sagas: Arc::new(InMemorySagaStore::new()),
            key_store: Arc::new(InMemoryKeyStore::new()),
        })
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/consents", post(create_consent))
        .route("/consents/:consent_id/authorize", post(authorize_consent))
        .route("/consents/:consent_id/revoke", post(revoke_consent))
        .route("/ais/accounts", get(list_accounts))
        .route("/ais/accounts/:account_id", get(get_account))
        .route("/ais/accounts/:account_id/balances", get(get_balances))
        .route("/ais/accounts/:account_id/transactions", get(get_transactions))
        .route("/bulk-payments/files", post(submit_bulk_file))
        .route("/bulk-payments/files/:file_id", get(get_bulk_file_status))
        .route("/bulk-payments/files/:file_id/report", get(get_bulk_file_report))
        .route("/fx/quotes", post(create_fx_quote))
        .route("/fx/quotes/:quote_id", get(get_fx_quote))
        .route("/fx/deals", post(execute_fx_deal))
        .route("/internal/secrets", post(post_secret))
        .route("/internal/secrets/:key", get(get_secret))
        .layer(axum::middleware::from_fn(security_headers))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn security_headers(request: axum::extract::Request, next: axum::middleware::Next) -> Response {
    let interaction_id = request
        .headers()
        .get("x-fapi-interaction-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("cache-control", "no-store".parse().unwrap());
    headers.insert("x-content-type-options", "nosniff".parse().unwrap());
    if let Some(interaction_id) = interaction_id {
        if let Ok(value) = interaction_id.parse() {
            headers.insert("x-fapi-interaction-id", value);
        }
    }
    response
}

/// Converts the axum-extracted request parts into the envelope's transport-agnostic
/// `InboundRequest` and runs the full FAPI validation chain.
async fn authenticate(
    state: &ServiceState,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    required_scope: &str,
) -> Result<Principal, ApiError> {
    let mut header_map = BTreeMap::new();
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            header_map.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }

    let inbound = InboundRequest {
        method: method.as_str().to_string(),
        url: format!("{}{}", state.public_base_url, uri.path()),
        mtls_thumbprint: header_map.get("x-client-cert-thumbprint").cloned(),
        request_uri: header_map.get("x-par-request-uri").cloned(),
        headers: header_map,
        required_scope: required_scope.to_string(),
        is_authorization_endpoint: false,
    };

    let principal = state.security.validate(&inbound, state.jwks.as_ref(), state.cache.as_ref(), Utc::now()).await?;
    check_rate_limit(state, &principal.participant_id, scope_class_for(uri.path()))?;
    Ok(principal)
}

fn scope_class_for(path: &str) -> ScopeClass {
    if path.starts_with("/ais/") {
        ScopeClass::Ais
    } else {
        ScopeClass::General
    }
}

fn check_rate_limit(state: &ServiceState, participant_id: &str, scope_class: ScopeClass) -> Result<(), ApiError> {
    match state.rate_limiter.check(participant_id, scope_class) {
        RateLimitOutcome::Allowed => Ok(()),
        RateLimitOutcome::Denied { retry_after } => Err(ApiError::RateLimited { retry_after }),
    }
}

fn request_hash_of<T: Serialize>(body: &T) -> Result<String, ApiError> {
    let bytes = serde_json::to_vec(body)
        .map_err(|e| PlatformError::fatal(format!("failed to serialize request body: {e}")))?;
    Ok(sha256_hex(&bytes))
}

fn require_idempotency_key(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("missing Idempotency-Key header".to_string()))
}

// ---- Consents (§4.3) ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateConsentBody {
    customer_id: String,
    scopes: Vec<String>,
    purpose: String,
    validity_days: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeConsentBody {
    #[serde(default)]
    account_whitelist: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevokeConsentBody {
    reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConsentResponse {
    consent_id: String,
    customer_id: String,
    participant_id: String,
    scopes: Vec<String>,
    purpose: String,
    status: ConsentStatus,
    created_at: DateTime<Utc>,
    authorized_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    sequence: u64,
}

impl From<Consent> for ConsentResponse {
    fn from(consent: Consent) -> Self {
        Self {
            consent_id: consent.consent_id.clone(),
            customer_id: consent.customer_id.clone(),
            participant_id: consent.participant_id.clone(),
            scopes: consent.scopes.iter().cloned().collect(),
            purpose: consent.purpose.clone(),
            status: consent.status,
            created_at: consent.created_at,
            authorized_at: consent.authorized_at,
            expires_at: consent.expires_at,
            revoked_at: consent.revoked_at,
            sequence: consent.last_sequence(),
        }
    }
}

async fn create_consent(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(body): Json<CreateConsentBody>,
) -> Result<(StatusCode, Json<ConsentResponse>), ApiError> {
    let principal = authenticate(
        &state,
        &Method::POST,
        &"/consents".parse().unwrap(),
        &headers,
        consent_usecases::SCOPE_CONSENTS_WRITE,
    )
    .await?;

    let request = CreateConsentRequest {
        consent_id: consent_usecases::new_consent_id(),
        customer_id: body.customer_id,
        participant_id: principal.participant_id,
        scopes: body.scopes.into_iter().collect(),
        purpose: body.purpose,
        validity_days: body.validity_days,
    };
    let consent =
        consent_usecases::create_consent(state.consent_port.as_ref(), request, &principal.interaction_id).await?;
    Ok((StatusCode::CREATED, Json(consent.into())))
}

async fn authorize_consent(
    State(state): State<ServiceState>,
    Path(consent_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AuthorizeConsentBody>,
) -> Result<Json<ConsentResponse>, ApiError> {
    let uri: Uri = format!("/consents/{consent_id}/authorize").parse().unwrap();
    let principal =
        authenticate(&state, &Method::POST, &uri, &headers, consent_usecases::SCOPE_CONSENTS_WRITE).await?;

    let context = AuthorizeContext { account_whitelist: body.account_whitelist.into_iter().collect() };
    let consent = consent_usecases::authorize_consent(
        state.consent_port.as_ref(),
        &consent_id,
        &principal.participant_id,
        context,
        &principal.interaction_id,
    )
    .await?;
    Ok(Json(consent.into()))
}

async fn revoke_consent(
    State(state): State<ServiceState>,
    Path(consent_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RevokeConsentBody>,
) -> Result<Json<ConsentResponse>, ApiError> {
    let uri: Uri = format!("/consents/{consent_id}/revoke").parse().unwrap();
    let principal =
        authenticate(&state, &Method::POST, &uri, &headers, consent_usecases::SCOPE_CONSENTS_WRITE).await?;

    let consent = consent_usecases::revoke_consent(
        state.consent_port.as_ref(),
        &consent_id,
        &principal.participant_id,
        &body.reason,
        &principal.interaction_id,
    )
    .await?;
    Ok(Json(consent.into()))
}

// ---- Account Information Services (§4.5.1) ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AisListQuery {
    consent_id: String,
    customer_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AisItemQuery {
    consent_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionsQuery {
    consent_id: String,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    #[serde(default)]
    page: Option<u32>,
    page_size: Option<u32>,
}

async fn list_accounts(
    State(state): State<ServiceState>,
    Query(query): Query<AisListQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<openfinance_core::domain::ais::Account>>, ApiError> {
    let principal =
        authenticate(&state, &Method::GET, &"/ais/accounts".parse().unwrap(), &headers, ais::SCOPE_ACCOUNTS_READ)
            .await?;
    let accounts = ais::list_accounts(
        state.consent_port.as_ref(),
        state.accounts.as_ref(),
        &query.consent_id,
        &principal.participant_id,
        &query.customer_id,
        Utc::now(),
    )
    .await?;
    Ok(Json(accounts))
}

async fn get_account(
    State(state): State<ServiceState>,
    Path(account_id): Path<String>,
    Query(query): Query<AisItemQuery>,
    headers: HeaderMap,
) -> Result<Json<openfinance_core::domain::ais::Account>, ApiError> {
    let uri: Uri = format!("/ais/accounts/{account_id}").parse().unwrap();
    let principal = authenticate(&state, &Method::GET, &uri, &headers, ais::SCOPE_ACCOUNTS_READ).await?;
    let account = ais::get_account(
        state.consent_port.as_ref(),
        state.accounts.as_ref(),
        &query.consent_id,
        &principal.participant_id,
        &account_id,
        Utc::now(),
    )
    .await?;
    Ok(Json(account))
}

async fn get_balances(
    State(state): State<ServiceState>,
    Path(account_id): Path<String>,
    Query(query): Query<AisItemQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<Balance>>, ApiError> {
    let uri: Uri = format!("/ais/accounts/{account_id}/balances").parse().unwrap();
    let principal = authenticate(&state, &Method::GET, &uri, &headers, ais::SCOPE_ACCOUNTS_READ).await?;
    let balances = ais::get_balances(
        state.consent_port.as_ref(),
        state.accounts.as_ref(),
        &query.consent_id,
        &principal.participant_id,
        &account_id,
        Utc::now(),
    )
    .await?;
    Ok(Json(balances))
}

async fn get_transactions(
    State(state): State<ServiceState>,
    Path(account_id): Path<String>,
    Query(query): Query<TransactionsQuery>,
    headers: HeaderMap,
) -> Result<Json<TransactionPage>, ApiError> {
    let uri: Uri = format!("/ais/accounts/{account_id}/transactions").parse().unwrap();
    let principal = authenticate(&state, &Method::GET, &uri, &headers, ais::SCOPE_ACCOUNTS_READ).await?;
    let page = ais::get_transactions(
        state.consent_port.as_ref(),
        state.accounts.as_ref(),
        &query.consent_id,
        &principal.participant_id,
        &account_id,
        query.from,
        query.to,
        query.page.unwrap_or(1),
        query.page_size,
        &state.settings,
        Utc::now(),
    )
    .await?;
    Ok(Json(page))
}

// ---- Bulk Payments (§4.5.2) ----

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBulkFileBody {
    consent_id: String,
    file_name: String,
    integrity_mode: IntegrityMode,
    file_content: String,
    file_hash: String,
}

async fn submit_bulk_file(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(body): Json<SubmitBulkFileBody>,
) -> Result<(StatusCode, Json<BulkFile>), ApiError> {
    let principal = authenticate(
        &state,
        &Method::POST,
        &"/bulk-payments/files".parse().unwrap(),
        &headers,
        bulk_payments::SCOPE_BULK_PAYMENT,
    )
    .await?;
    let idempotency_key = require_idempotency_key(&headers)?;
    let request_hash = request_hash_of(&body)?;

    let file_id = Uuid::new_v4().to_string();
    match state.rate_limiter.begin_bulk_submission(&principal.participant_id, &file_id) {
        RateLimitOutcome::Allowed => {}
        RateLimitOutcome::Denied { retry_after } => return Err(ApiError::RateLimited { retry_after }),
    }

    let result = bulk_payments::submit_file(
        state.consent_port.as_ref(),
        state.bulk_files.as_ref(),
        state.idempotency.as_ref(),
        state.bus.as_ref(),
        &file_id,
        &body.consent_id,
        &principal.participant_id,
        &idempotency_key,
        &request_hash,
        &body.file_name,
        body.integrity_mode,
        &body.file_content,
        &body.file_hash,
        &state.settings,
        Utc::now(),
    )
    .await;

    let file = match result {
        Ok(file) => file,
        Err(err) => {
            state.rate_limiter.release_bulk_submission(&principal.participant_id, &file_id);
            return Err(err.into());
        }
    };
    if file.file_id != file_id {
        // Idempotency replay returned a pre-existing file; our reservation was never used.
        state.rate_limiter.release_bulk_submission(&principal.participant_id, &file_id);
    }
    Ok((StatusCode::ACCEPTED, Json(file)))
}

async fn get_bulk_file_status(
    State(state): State<ServiceState>,
    Path(file_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<BulkFile>, ApiError> {
    let uri: Uri = format!("/bulk-payments/files/{file_id}").parse().unwrap();
    authenticate(&state, &Method::GET, &uri, &headers, bulk_payments::SCOPE_BULK_PAYMENT).await?;
    let (file, just_completed) = bulk_payments::get_file_status(state.bulk_files.as_ref(), &file_id).await?;
    if just_completed {
        state.rate_limiter.release_bulk_submission(&file.participant_id, &file.file_id);
    }
    Ok(Json(file))
}

async fn get_bulk_file_report(
    State(state): State<ServiceState>,
    Path(file_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<BulkReport>, ApiError> {
    let uri: Uri = format!("/bulk-payments/files/{file_id}/report").parse().unwrap();
    let principal = authenticate(&state, &Method::GET, &uri, &headers, bulk_payments::SCOPE_BULK_PAYMENT).await?;
    let report = bulk_payments::get_file_report(
        state.cache.as_ref(),
        state.bulk_files.as_ref(),
        &principal.participant_id,
        &file_id,
    )
    .await?;
    Ok(Json(report))
}

// ---- FX Quoting/Dealing (§4.5.3) ----

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateQuoteBody {
    source_currency: String,
    target_currency: String,
    source_amount: f64,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteDealBody {
    quote_id: String,
}

async fn create_fx_quote(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(body): Json<CreateQuoteBody>,
) -> Result<(StatusCode, Json<FxQuote>), ApiError> {
    let principal =
        authenticate(&state, &Method::POST, &"/fx/quotes".parse().unwrap(), &headers, fx::SCOPE_FX_DEAL).await?;
    let idempotency_key = require_idempotency_key(&headers)?;
    let request_hash = request_hash_of(&body)?;

    let quote = fx::create_quote(
        state.fx.as_ref(),
        state.idempotency.as_ref(),
        state.bus.as_ref(),
        state.rates.as_ref(),
        &principal.participant_id,
        &idempotency_key,
        &request_hash,
        &body.source_currency,
        &body.target_currency,
        body.source_amount,
        &state.settings,
        Utc::now(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(quote)))
}

async fn execute_fx_deal(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(body): Json<ExecuteDealBody>,
) -> Result<(StatusCode, Json<FxDeal>), ApiError> {
    let principal =
        authenticate(&state, &Method::POST, &"/fx/deals".parse().unwrap(), &headers, fx::SCOPE_FX_DEAL).await?;
    let idempotency_key = require_idempotency_key(&headers)?;
    let request_hash = request_hash_of(&body)?;

    let deal = fx::execute_deal(
        state.fx.as_ref(),
        state.idempotency.as_ref(),
        state.bus.as_ref(),
        &body.quote_id,
        &principal.participant_id,
        &idempotency_key,
        &request_hash,
        &state.settings,
        Utc::now(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(deal)))
}

async fn get_fx_quote(
    State(state): State<ServiceState>,
    Path(quote_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<FxQuote>, ApiError> {
    let uri: Uri = format!("/fx/quotes/{quote_id}").parse().unwrap();
    let principal = authenticate(&state, &Method::GET, &uri, &headers, fx::SCOPE_FX_DEAL).await?;
    let quote =
        fx::get_quote(state.fx.as_ref(), state.cache.as_ref(), &quote_id, &principal.participant_id, Utc::now())
            .await?;
    Ok(Json(quote))
}

// ---- Key Material Store (C13, §4.9) — internal, mTLS-only ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreSecretBody {
    key: String,
    plaintext: String,
    salt: String,
}

async fn post_secret(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(body): Json<StoreSecretBody>,
) -> Result<(StatusCode, Json<SecretMetadata>), ApiError> {
    let principal =
        authenticate(&state, &Method::POST, &"/internal/secrets".parse().unwrap(), &headers, SCOPE_INTERNAL_SECRETS)
            .await?;
    let metadata = store_secret(
        state.key_store.as_ref(),
        &principal.participant_id,
        &body.key,
        &body.plaintext,
        &body.salt,
        Utc::now(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(metadata)))
}

async fn get_secret(
    State(state): State<ServiceState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SecretMetadata>, ApiError> {
    let uri: Uri = format!("/internal/secrets/{key}").parse().unwrap();
    authenticate(&state, &Method::GET, &uri, &headers, SCOPE_INTERNAL_SECRETS).await?;
    let metadata = get_secret_metadata(state.key_store.as_ref(), &key).await?;
    Ok(Json(metadata))
}

// ---- Error mapping (§7) ----

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] PlatformError),
    #[error("rate limit exceeded")]
    RateLimited { retry_after: Duration },
    #[error("{0}")]
    BadRequest(String),
}

fn status_for(err: &PlatformError) -> StatusCode {
    match err {
        PlatformError::Security { .. } => StatusCode::UNAUTHORIZED,
        PlatformError::Authorization { .. } => StatusCode::FORBIDDEN,
        PlatformError::Validation { .. } => StatusCode::BAD_REQUEST,
        PlatformError::BusinessRule { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PlatformError::IdempotencyConflict { .. } => StatusCode::CONFLICT,
        PlatformError::Concurrency { .. } => StatusCode::CONFLICT,
        PlatformError::Transient { .. } => StatusCode::SERVICE_UNAVAILABLE,
        PlatformError::ResourceNotFound { .. } => StatusCode::NOT_FOUND,
        PlatformError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        PlatformError::Fatal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, retry_after) = match self {
            ApiError::Core(err) => {
                if !matches!(err, PlatformError::ResourceNotFound { .. } | PlatformError::Validation { .. }) {
                    tracing::warn!(error_code = err.error_code(), "request failed: {err}");
                }
                (status_for(&err), err.error_code().to_string(), err.to_string(), None)
            }
            ApiError::RateLimited { retry_after } => {
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED".to_string(), "request rate limit exceeded".to_string(), Some(retry_after))
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "SCHEMA_VALIDATION_FAILED".to_string(), message, None),
        };

        let mut response =
            (status, Json(serde_json::json!({ "errorCode": error_code, "message": message }))).into_response();
        if let Some(retry_after) = retry_after {
            if let Ok(value) = retry_after.as_secs().to_string().parse() {
                response.headers_mut().insert("retry-after", value);
            }
        }
        response
    }
}
