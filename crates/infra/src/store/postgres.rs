//! Postgres-backed item store + movement ledger.
//!
//! ## Schema
//!
//! `environments`, `items` (with a nullable `current_environment_id`) and
//! `movements`. The ledger table rejects `UPDATE`/`DELETE` through a trigger
//! and carries a check constraint forbidding self-moves.
//!
//! ## Relocation commit
//!
//! One transaction:
//! 1. take a transaction-scoped advisory lock so ledger sequence and timestamps
//!    are assigned in commit order
//! 2. compare-and-set `items.current_environment_id`
//! 3. insert the ledger row
//!
//! If the compare-and-set matches no row the transaction is rolled back and
//! `StaleLocation` is returned.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (foreign key / check violation) | `23503` / `23514` | `StaleLocation` |
//! | anything else | — | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use placetrack_core::{EnvironmentId, ItemId, MovementId, UserId};
use placetrack_inventory::{Environment, Item, ItemRelocated, MovementRecord};

use super::query::{MovementFilter, MovementPage, Pagination};
use super::r#trait::{ItemStore, MovementLedger, RelocationStore, StoreError};

/// Advisory lock key serializing ledger appends.
const LEDGER_LOCK_KEY: i64 = 0x706c_6163_6574_726b;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS environments (
    id          UUID PRIMARY KEY,
    label       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS items (
    id                      UUID PRIMARY KEY,
    name                    TEXT NOT NULL,
    item_type               TEXT NULL,
    registered_by           UUID NOT NULL,
    registered_at           TIMESTAMPTZ NOT NULL,
    current_environment_id  UUID NULL REFERENCES environments(id)
);

CREATE INDEX IF NOT EXISTS items_current_environment_idx
    ON items (current_environment_id);

CREATE TABLE IF NOT EXISTS movements (
    sequence                 BIGINT PRIMARY KEY CHECK (sequence > 0),
    id                       UUID NOT NULL UNIQUE,
    item_id                  UUID NOT NULL REFERENCES items(id),
    previous_environment_id  UUID NULL REFERENCES environments(id),
    next_environment_id      UUID NOT NULL REFERENCES environments(id),
    mover                    UUID NOT NULL,
    moved_at                 TIMESTAMPTZ NOT NULL,
    CHECK (previous_environment_id IS DISTINCT FROM next_environment_id)
);

CREATE INDEX IF NOT EXISTS movements_item_idx ON movements (item_id, sequence);
CREATE INDEX IF NOT EXISTS movements_moved_at_idx ON movements (moved_at);

CREATE OR REPLACE FUNCTION movements_append_only() RETURNS trigger AS $$
BEGIN
    RAISE EXCEPTION 'movements ledger is append-only';
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS movements_append_only ON movements;
CREATE TRIGGER movements_append_only
    BEFORE UPDATE OR DELETE ON movements
    FOR EACH ROW EXECUTE FUNCTION movements_append_only();
"#;

const MOVEMENT_COLUMNS: &str = r#"
    sequence, id, item_id, previous_environment_id, next_environment_id, mover, moved_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, name, item_type, registered_by, registered_at, current_environment_id
"#;

/// Postgres-backed store.
///
/// Uses the SQLx connection pool which is thread-safe (Arc + Send + Sync).
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create tables, indexes and the append-only trigger if missing.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl ItemStore for PostgresStore {
    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn find_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_item", e))?;

        row.as_ref().map(item_from_row).transpose()
    }

    #[instrument(skip(self), fields(environment_id = %id), err)]
    async fn find_environment(&self, id: EnvironmentId) -> Result<Option<Environment>, StoreError> {
        let row = sqlx::query("SELECT id, label FROM environments WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_environment", e))?;

        row.as_ref().map(environment_from_row).transpose()
    }

    #[instrument(skip(self, item), fields(item_id = %item.id_typed()), err)]
    async fn insert_item(&self, item: Item) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO items (id, name, item_type, registered_by, registered_at, current_environment_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(item.id_typed().as_uuid())
        .bind(item.name())
        .bind(item.item_type())
        .bind(item.registered_by().as_uuid())
        .bind(item.registered_at())
        .bind(item.current_environment().map(|e| *e.as_uuid()))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(())
    }

    #[instrument(skip(self, environment), fields(environment_id = %environment.id_typed()), err)]
    async fn insert_environment(&self, environment: Environment) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO environments (id, label) VALUES ($1, $2)")
            .bind(environment.id_typed().as_uuid())
            .bind(environment.label())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_environment", e))?;
        Ok(())
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY id"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_items", e))?;

        rows.iter().map(item_from_row).collect()
    }

    async fn list_items_in(&self, environment: EnvironmentId) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE current_environment_id = $1 ORDER BY id"
        ))
        .bind(environment.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_items_in", e))?;

        rows.iter().map(item_from_row).collect()
    }

    async fn list_environments(&self) -> Result<Vec<Environment>, StoreError> {
        let rows = sqlx::query("SELECT id, label FROM environments ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_environments", e))?;

        rows.iter().map(environment_from_row).collect()
    }
}

#[async_trait]
impl MovementLedger for PostgresStore {
    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn history(&self, item_id: ItemId) -> Result<Vec<MovementRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movements WHERE item_id = $1 ORDER BY sequence ASC"
        ))
        .bind(item_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("history", e))?;

        rows.iter().map(movement_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn query(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        // Optional filters collapse to TRUE when their parameter is NULL.
        const WHERE: &str = r#"
            WHERE ($1::uuid IS NULL OR item_id = $1)
                AND ($2::uuid IS NULL OR next_environment_id = $2 OR previous_environment_id = $2)
                AND ($3::uuid IS NULL OR mover = $3)
                AND ($4::timestamptz IS NULL OR moved_at >= $4)
                AND ($5::timestamptz IS NULL OR moved_at <= $5)
        "#;

        let item_id = filter.item_id.map(|id| *id.as_uuid());
        let environment_id = filter.environment_id.map(|id| *id.as_uuid());
        let mover = filter.mover.map(|id| *id.as_uuid());

        let count_row = sqlx::query(&format!("SELECT COUNT(*) AS total FROM movements {WHERE}"))
            .bind(item_id)
            .bind(environment_id)
            .bind(mover)
            .bind(filter.moved_after)
            .bind(filter.moved_before)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_movements", e))?;

        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| StoreError::Corrupt(format!("failed to read count: {e}")))?;

        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movements {WHERE} ORDER BY sequence ASC LIMIT $6 OFFSET $7"
        ))
        .bind(item_id)
        .bind(environment_id)
        .bind(mover)
        .bind(filter.moved_after)
        .bind(filter.moved_before)
        .bind(i64::from(pagination.limit))
        .bind(i64::from(pagination.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_movements", e))?;

        let records = rows
            .iter()
            .map(movement_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MovementPage::new(records, total.max(0) as u64, pagination))
    }
}

#[async_trait]
impl RelocationStore for PostgresStore {
    #[instrument(
        skip(self, decided),
        fields(
            item_id = %decided.item_id,
            next_environment = %decided.next_environment
        ),
        err
    )]
    async fn commit_relocation(&self, decided: ItemRelocated) -> Result<MovementRecord, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(LEDGER_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("ledger_lock", e))?;

        let updated = sqlx::query(
            r#"
            UPDATE items
            SET current_environment_id = $1
            WHERE id = $2 AND current_environment_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(decided.next_environment.as_uuid())
        .bind(decided.item_id.as_uuid())
        .bind(decided.previous_environment.map(|e| *e.as_uuid()))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_item_location", e))?;

        if updated.rows_affected() != 1 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::StaleLocation(format!(
                "item {} is no longer in {:?}",
                decided.item_id, decided.previous_environment
            )));
        }

        let tail = sqlx::query(
            "SELECT COALESCE(MAX(sequence), 0) AS last_sequence, MAX(moved_at) AS last_moved_at FROM movements",
        )
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("ledger_tail", e))?;

        let last_sequence: i64 = tail
            .try_get("last_sequence")
            .map_err(|e| StoreError::Corrupt(format!("failed to read last_sequence: {e}")))?;
        let last_moved_at: Option<DateTime<Utc>> = tail
            .try_get("last_moved_at")
            .map_err(|e| StoreError::Corrupt(format!("failed to read last_moved_at: {e}")))?;

        let record = MovementRecord::commit(decided, last_sequence as u64 + 1, last_moved_at);

        sqlx::query(
            r#"
            INSERT INTO movements (
                sequence, id, item_id, previous_environment_id, next_environment_id, mover, moved_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.sequence as i64)
        .bind(record.id.as_uuid())
        .bind(record.item_id.as_uuid())
        .bind(record.previous_environment.map(|e| *e.as_uuid()))
        .bind(record.next_environment.as_uuid())
        .bind(record.mover.as_uuid())
        .bind(record.moved_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(record)
    }
}

fn item_from_row(row: &sqlx::postgres::PgRow) -> Result<Item, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Corrupt(format!("failed to decode item row: {e}"));

    let current: Option<uuid::Uuid> = row.try_get("current_environment_id").map_err(decode)?;
    Ok(Item::restore(
        ItemId::from_uuid(row.try_get("id").map_err(decode)?),
        row.try_get("name").map_err(decode)?,
        row.try_get("item_type").map_err(decode)?,
        UserId::from_uuid(row.try_get("registered_by").map_err(decode)?),
        row.try_get("registered_at").map_err(decode)?,
        current.map(EnvironmentId::from_uuid),
    ))
}

fn environment_from_row(row: &sqlx::postgres::PgRow) -> Result<Environment, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Corrupt(format!("failed to decode environment row: {e}"));

    let id: uuid::Uuid = row.try_get("id").map_err(decode)?;
    let label: String = row.try_get("label").map_err(decode)?;
    Environment::new(EnvironmentId::from_uuid(id), label)
        .map_err(|e| StoreError::Corrupt(format!("environment {id}: {e}")))
}

fn movement_from_row(row: &sqlx::postgres::PgRow) -> Result<MovementRecord, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Corrupt(format!("failed to decode movement row: {e}"));

    let sequence: i64 = row.try_get("sequence").map_err(decode)?;
    let previous: Option<uuid::Uuid> = row.try_get("previous_environment_id").map_err(decode)?;

    Ok(MovementRecord {
        id: MovementId::from_uuid(row.try_get("id").map_err(decode)?),
        sequence: sequence as u64,
        item_id: ItemId::from_uuid(row.try_get("item_id").map_err(decode)?),
        previous_environment: previous.map(EnvironmentId::from_uuid),
        next_environment: EnvironmentId::from_uuid(
            row.try_get("next_environment_id").map_err(decode)?,
        ),
        mover: UserId::from_uuid(row.try_get("mover").map_err(decode)?),
        moved_at: row.try_get("moved_at").map_err(decode)?,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                Some("23503") | Some("23514") => StoreError::StaleLocation(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
