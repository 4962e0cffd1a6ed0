//! Concrete port implementations wired at the composition root.
//!
//! `memory` holds dependency-free in-process adapters, suitable for tests and
//! single-process deployments. `postgres` holds the durable event-store and
//! outbox backend, mirroring `ibank-core::storage`'s split between an
//! in-memory ledger and a Postgres-backed one.

#![deny(unsafe_code)]

pub mod memory;
pub mod postgres;
