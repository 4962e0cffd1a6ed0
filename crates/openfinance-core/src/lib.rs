//! Open Finance platform core: FAPI 2.0 security envelope, consent lifecycle,
//! AIS/Bulk/FX use-cases, saga orchestration, and the supporting ambient stack.
//!
//! This crate depends only on the port traits in [`ports`]; concrete storage,
//! bus, and directory adapters are wired once at the composition root.

#![deny(unsafe_code)]

pub mod domain;
pub mod error;
pub mod key_store;
pub mod orchestrator;
pub mod outbox;
pub mod ports;
pub mod rate_limit;
pub mod security;
pub mod settings;
pub mod usecases;

pub use error::{PlatformError, PlatformResult};
pub use orchestrator::{SagaOrchestrator, SagaStep};
pub use outbox::OutboxDispatcher;
pub use rate_limit::{RateLimitOutcome, RateLimiter, ScopeClass};
pub use security::{FapiSecurityEnvelope, InboundRequest, Principal};
pub use settings::PlatformSettings;
