use async_trait::async_trait;
use chrono::Utc;
use openfinance_core::domain::consent::ConsentEvent;
use openfinance_core::domain::events::{DomainEvent, OutboxRow, OutboxStatus};
use openfinance_core::error::{PlatformError, PlatformResult};
use openfinance_core::ports::{EventStorePort, OutboxPort};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

/// Connection tuning for the Postgres-backed event store.
#[derive(Debug, Clone)]
pub struct PostgresStorageConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl PostgresStorageConfig {
    pub fn new(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self { database_url: database_url.into(), max_connections }
    }
}

/// Durable event store + transactional outbox (C5 + C12, §6.4's `events` and
/// `outbox` tables). `append` writes both tables inside one transaction so the
/// outbox row and the event it mirrors are atomic, per §4.4.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub async fn connect(config: PostgresStorageConfig) -> PlatformResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect(&config.database_url)
            .await
            .map_err(|e| PlatformError::service_unavailable(format!("postgres connect failed: {e}")))?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> PlatformResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                aggregate_id TEXT NOT NULL,
                sequence_number BIGINT NOT NULL,
                event_id TEXT NOT NULL,
                aggregate_type TEXT NOT NULL,
                event_type TEXT NOT NULL,
                event_version INTEGER NOT NULL,
                payload JSONB NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL,
                correlation_id TEXT NOT NULL,
                causation_id TEXT NULL,
                PRIMARY KEY (aggregate_id, sequence_number)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PlatformError::fatal(format!("postgres events schema create failed: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS outbox (
                id TEXT PRIMARY KEY,
                aggregate_id TEXT NOT NULL,
                sequence_number BIGINT NOT NULL,
                payload JSONB NOT NULL,
                status TEXT NOT NULL,
                dispatched_at TIMESTAMPTZ NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PlatformError::fatal(format!("postgres outbox schema create failed: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_outbox_status ON outbox (status)")
            .execute(&self.pool)
            .await
            .map_err(|e| PlatformError::fatal(format!("postgres outbox index create failed: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl EventStorePort for PostgresEventStore {
    async fn append(
        &self,
        aggregate_id: &str,
        expected_sequence: u64,
        events: Vec<ConsentEvent>,
    ) -> PlatformResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PlatformError::transient(format!("postgres begin failed: {e}")))?;

        let actual_sequence: i64 = sqlx::query(
            "SELECT COALESCE(MAX(sequence_number), 0) AS max_seq FROM events WHERE aggregate_id = $1",
        )
        .bind(aggregate_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| PlatformError::transient(format!("postgres sequence read failed: {e}")))?
        .try_get("max_seq")
        .map_err(|e| PlatformError::transient(format!("postgres sequence decode failed: {e}")))?;

        if actual_sequence as u64 != expected_sequence {
            return Err(PlatformError::concurrency(format!(
                "aggregate '{aggregate_id}' expected sequence {expected_sequence}, found {actual_sequence}"
            )));
        }

        for event in &events {
            let sequence_number: i64 = event.sequence_number as i64;
            sqlx::query(
                r#"
                INSERT INTO events (
                    aggregate_id, sequence_number, event_id, aggregate_type,
                    event_type, event_version, payload, occurred_at, correlation_id, causation_id
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(&event.aggregate_id)
            .bind(sequence_number)
            .bind(&event.event_id)
            .bind(&event.aggregate_type)
            .bind(&event.event_type)
            .bind(event.event_version as i32)
            .bind(&event.payload)
            .bind(event.occurred_at)
            .bind(&event.correlation_id)
            .bind(&event.causation_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| PlatformError::transient(format!("postgres event insert failed: {e}")))?;

            sqlx::query(
                "INSERT INTO outbox (id, aggregate_id, sequence_number, payload, status, dispatched_at) VALUES ($1, $2, $3, $4, $5, NULL)",
            )
            .bind(&event.event_id)
            .bind(&event.aggregate_id)
            .bind(sequence_number)
            .bind(serde_json::to_value(event).map_err(|e| PlatformError::fatal(format!("event serialize failed: {e}")))?)
            .bind("pending")
            .execute(&mut *tx)
            .await
            .map_err(|e| PlatformError::transient(format!("postgres outbox insert failed: {e}")))?;
        }

        tx.commit().await.map_err(|e| PlatformError::transient(format!("postgres commit failed: {e}")))?;
        Ok(())
    }

    async fn load_events(
        &self,
        aggregate_id: &str,
        after_sequence: u64,
    ) -> PlatformResult<Vec<ConsentEvent>> {
        let rows = sqlx::query(
            "SELECT event_id, aggregate_id, aggregate_type, sequence_number, event_type, event_version, occurred_at, correlation_id, causation_id, payload \
             FROM events WHERE aggregate_id = $1 AND sequence_number > $2 ORDER BY sequence_number ASC",
        )
        .bind(aggregate_id)
        .bind(after_sequence as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PlatformError::transient(format!("postgres load events failed: {e}")))?;

        rows.into_iter().map(row_to_event).collect()
    }

    async fn last_sequence(&self, aggregate_id: &str) -> PlatformResult<u64> {
        let max_seq: i64 = sqlx::query(
            "SELECT COALESCE(MAX(sequence_number), 0) AS max_seq FROM events WHERE aggregate_id = $1",
        )
        .bind(aggregate_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PlatformError::transient(format!("postgres sequence read failed: {e}")))?
        .try_get("max_seq")
        .map_err(|e| PlatformError::transient(format!("postgres sequence decode failed: {e}")))?;
        Ok(max_seq as u64)
    }
}

#[async_trait]
impl OutboxPort for PostgresEventStore {
    async fn append(&self, _row: OutboxRow) -> PlatformResult<()> {
        // Rows are written by `EventStorePort::append` inside the same transaction
        // as the event they mirror; a standalone append would break the atomicity
        // guarantee §4.4 requires, so this port is satisfied by the append above.
        Ok(())
    }

    async fn pending_for_aggregate(&self, aggregate_id: &str) -> PlatformResult<Vec<OutboxRow>> {
        let rows = sqlx::query(
            "SELECT id, aggregate_id, sequence_number, payload, status, dispatched_at FROM outbox WHERE aggregate_id = $1 AND status = 'pending'",
        )
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PlatformError::transient(format!("postgres outbox read failed: {e}")))?;
        rows.into_iter().map(row_to_outbox_row).collect()
    }

    async fn aggregates_with_pending_rows(&self) -> PlatformResult<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT aggregate_id FROM outbox WHERE status = 'pending'")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PlatformError::transient(format!("postgres outbox scan failed: {e}")))?;
        rows.into_iter()
            .map(|row| {
                row.try_get::<String, _>("aggregate_id")
                    .map_err(|e| PlatformError::transient(format!("postgres outbox decode failed: {e}")))
            })
            .collect()
    }

    async fn mark_dispatched(&self, row_id: &str) -> PlatformResult<()> {
        sqlx::query("UPDATE outbox SET status = 'dispatched', dispatched_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(row_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PlatformError::transient(format!("postgres outbox update failed: {e}")))?;
        Ok(())
    }
}

fn row_to_event(row: sqlx::postgres::PgRow) -> PlatformResult<DomainEvent> {
    let sequence_number: i64 = row
        .try_get("sequence_number")
        .map_err(|e| PlatformError::transient(format!("postgres decode sequence_number failed: {e}")))?;
    let event_version: i32 = row
        .try_get("event_version")
        .map_err(|e| PlatformError::transient(format!("postgres decode event_version failed: {e}")))?;

    Ok(DomainEvent {
        event_id: row.try_get("event_id").map_err(|e| PlatformError::transient(format!("postgres decode event_id failed: {e}")))?,
        aggregate_id: row.try_get("aggregate_id").map_err(|e| PlatformError::transient(format!("postgres decode aggregate_id failed: {e}")))?,
        aggregate_type: row.try_get("aggregate_type").map_err(|e| PlatformError::transient(format!("postgres decode aggregate_type failed: {e}")))?,
        sequence_number: sequence_number as u64,
        event_type: row.try_get("event_type").map_err(|e| PlatformError::transient(format!("postgres decode event_type failed: {e}")))?,
        event_version: event_version as u32,
        occurred_at: row.try_get("occurred_at").map_err(|e| PlatformError::transient(format!("postgres decode occurred_at failed: {e}")))?,
        correlation_id: row.try_get("correlation_id").map_err(|e| PlatformError::transient(format!("postgres decode correlation_id failed: {e}")))?,
        causation_id: row.try_get("causation_id").map_err(|e| PlatformError::transient(format!("postgres decode causation_id failed: {e}")))?,
        payload: row.try_get("payload").map_err(|e| PlatformError::transient(format!("postgres decode payload failed: {e}")))?,
    })
}

fn row_to_outbox_row(row: sqlx::postgres::PgRow) -> PlatformResult<OutboxRow> {
    let sequence_number: i64 = row
        .try_get("sequence_number")
        .map_err(|e| PlatformError::transient(format!("postgres decode sequence_number failed: {e}")))?;
    let status: String = row.try_get("status").map_err(|e| PlatformError::transient(format!("postgres decode status failed: {e}")))?;
    let payload: serde_json::Value = row.try_get("payload").map_err(|e| PlatformError::transient(format!("postgres decode payload failed: {e}")))?;
    let event: DomainEvent = serde_json::from_value(payload).map_err(|e| PlatformError::fatal(format!("outbox payload decode failed: {e}")))?;

    Ok(OutboxRow {
        id: row.try_get("id").map_err(|e| PlatformError::transient(format!("postgres decode id failed: {e}")))?,
        aggregate_id: row.try_get("aggregate_id").map_err(|e| PlatformError::transient(format!("postgres decode aggregate_id failed: {e}")))?,
        sequence_number: sequence_number as u64,
        event,
        status: if status == "dispatched" { OutboxStatus::Dispatched } else { OutboxStatus::Pending },
        dispatched_at: row.try_get("dispatched_at").map_err(|e| PlatformError::transient(format!("postgres decode dispatched_at failed: {e}")))?,
    })
}
