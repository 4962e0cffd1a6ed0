//! Postgres-backed durable storage, mirroring `ibank_core::storage`'s split
//! between an in-memory ledger and a `PostgresLedgerStore`. Only the event
//! store and outbox — the two tables §5's durability requirement actually
//! constrains to a single local transaction — get a Postgres implementation
//! here; see DESIGN.md for the scope decision on the remaining ports.

mod event_store;

pub use event_store::{PostgresEventStore, PostgresStorageConfig};
