//! Postgres-backed ledger store.
//!
//! Batches carry a `version` column; every commit runs in one transaction that
//! locks the touched rows (`SELECT ... FOR UPDATE`, in key order), checks the
//! expected versions, writes the new rows, recomputes `warehouse_totals` and
//! appends the transaction records. The store is therefore [`Atomicity::MultiKey`].
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Concurrent create of the same batch or log position |
//! | Database (check violation) | `23514` | `Backend` | Negative quantity reached the database |
//! | Database (serialization failure) | `40001` | `Conflict` | Concurrent transaction |
//! | Database (other) / PoolClosed / other | any | `Backend` | Network errors, connection failures, etc. |
//!
//! The store traits are synchronous; calls are bridged onto the ambient tokio
//! runtime with `Handle::block_on`, so they must run on a blocking thread
//! (e.g. inside `spawn_blocking`).

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use tracing::instrument;

use stockledger_core::{ActorName, BatchCode, ExpectedVersion, ProductName, WarehouseId};
use stockledger_ledger::rules::apply_write;
use stockledger_ledger::{
    Batch, BatchKey, BatchWrite, Changeset, Transaction, TransactionId, TransactionType, TransferIntent,
};

use super::{Atomicity, BatchStore, LedgerStore, PurgeSummary, StoreError, TransactionLog, TransferJournal};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS batches (
        warehouse_id TEXT NOT NULL,
        code TEXT NOT NULL,
        product TEXT NOT NULL,
        product_ref TEXT NOT NULL,
        quantity BIGINT NOT NULL CHECK (quantity >= 0),
        unit TEXT NOT NULL,
        expiry_date DATE,
        reason TEXT NOT NULL,
        category TEXT NOT NULL,
        created_by TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        version BIGINT NOT NULL,
        PRIMARY KEY (warehouse_id, code)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_transactions (
        warehouse_id TEXT NOT NULL,
        sequence BIGINT NOT NULL,
        id TEXT NOT NULL,
        kind TEXT NOT NULL,
        product TEXT NOT NULL,
        code TEXT NOT NULL,
        quantity BIGINT NOT NULL CHECK (quantity >= 0),
        unit TEXT NOT NULL,
        expiry_date DATE,
        reason TEXT NOT NULL,
        category TEXT NOT NULL,
        actor TEXT NOT NULL,
        occurred_at TIMESTAMPTZ NOT NULL,
        counterpart_warehouse TEXT,
        previous_quantity BIGINT,
        PRIMARY KEY (warehouse_id, sequence)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ledger_transactions_by_id ON ledger_transactions (warehouse_id, id)",
    r#"
    CREATE TABLE IF NOT EXISTS warehouse_totals (
        warehouse_id TEXT PRIMARY KEY,
        total_items BIGINT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transfer_intents (
        id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        body JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

const BATCH_COLUMNS: &str = "warehouse_id, code, product, product_ref, quantity, unit, expiry_date, \
     reason, category, created_by, created_at, version";

const TRANSACTION_COLUMNS: &str = "warehouse_id, sequence, id, kind, product, code, quantity, unit, \
     expiry_date, reason, category, actor, occurred_at, counterpart_warehouse, previous_quantity";

/// Postgres-backed ledger store.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    fn block_on<F, T>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            StoreError::Backend(
                "PostgresLedgerStore requires a tokio runtime; call it from spawn_blocking".to_string(),
            )
        })?;
        handle.block_on(fut)
    }

    async fn fetch_batch(&self, key: &BatchKey) -> Result<Option<Batch>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE warehouse_id = $1 AND code = $2"
        ))
        .bind(key.warehouse_id.as_str())
        .bind(key.code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_batch", e))?;
        row.map(|r| batch_from_row(&r)).transpose()
    }

    async fn fetch_batches(&self, warehouse_id: &WarehouseId) -> Result<Vec<Batch>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE warehouse_id = $1 ORDER BY code ASC"
        ))
        .bind(warehouse_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_batches", e))?;
        rows.iter().map(batch_from_row).collect()
    }

    #[instrument(skip(self, changeset), fields(writes = changeset.writes.len(), records = changeset.transactions.len()))]
    async fn commit_async(&self, changeset: Changeset) -> Result<Vec<Transaction>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Lock rows in key order so two commits over the same keys cannot deadlock.
        let keys: BTreeSet<BatchKey> = changeset.keys().into_iter().collect();
        let mut current: BTreeMap<BatchKey, Option<Batch>> = BTreeMap::new();
        for key in keys {
            let row = sqlx::query(&format!(
                "SELECT {BATCH_COLUMNS} FROM batches WHERE warehouse_id = $1 AND code = $2 FOR UPDATE"
            ))
            .bind(key.warehouse_id.as_str())
            .bind(key.code.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_batch", e))?;
            let batch = row.map(|r| batch_from_row(&r)).transpose()?;
            current.insert(key, batch);
        }

        let mut existed: BTreeSet<BatchKey> = current
            .iter()
            .filter(|(_, b)| b.is_some())
            .map(|(k, _)| k.clone())
            .collect();

        for write in &changeset.writes {
            let key = write.key();
            let before = current.get(&key).cloned().flatten();
            let actual = before.as_ref().map(|b| b.version);
            let expected = write.expected();
            if !expected.matches(actual) {
                return Err(StoreError::version_mismatch(&key, expected, actual));
            }
            let next = apply_write(before.as_ref(), write).map_err(|e| StoreError::from_write(&key, e))?;
            current.insert(key, Some(next));
        }

        let mut touched = BTreeSet::new();
        for (key, batch) in &current {
            let Some(batch) = batch else { continue };
            touched.insert(key.warehouse_id.clone());
            if existed.remove(key) {
                update_batch(&mut tx, batch).await?;
            } else {
                insert_batch(&mut tx, batch).await?;
            }
        }

        for warehouse_id in &touched {
            refresh_total(&mut tx, warehouse_id).await?;
        }

        let mut stored = Vec::with_capacity(changeset.transactions.len());
        for mut record in changeset.transactions {
            let last: i64 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(sequence), 0) FROM ledger_transactions WHERE warehouse_id = $1",
            )
            .bind(record.warehouse_id.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("next_sequence", e))?;
            record.sequence = last as u64 + 1;
            insert_transaction(&mut tx, &record).await?;
            stored.push(record);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(stored)
    }

    async fn write_one(&self, write: BatchWrite) -> Result<Batch, StoreError> {
        let key = write.key();
        self.commit_async(Changeset::new(vec![write], vec![])).await?;
        self.fetch_batch(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("batch '{key}'")))
    }

    async fn fetch_transactions(&self, warehouse_id: Option<&WarehouseId>) -> Result<Vec<Transaction>, StoreError> {
        let rows = match warehouse_id {
            Some(w) => sqlx::query(&format!(
                "SELECT {TRANSACTION_COLUMNS} FROM ledger_transactions WHERE warehouse_id = $1 ORDER BY sequence ASC"
            ))
            .bind(w.as_str())
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query(&format!(
                "SELECT {TRANSACTION_COLUMNS} FROM ledger_transactions \
                 ORDER BY occurred_at DESC, sequence DESC, warehouse_id ASC"
            ))
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(|e| map_sqlx_error("fetch_transactions", e))?;
        rows.iter().map(transaction_from_row).collect()
    }

    async fn purge_batch_async(&self, key: &BatchKey, expected: ExpectedVersion) -> Result<Batch, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let row = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE warehouse_id = $1 AND code = $2 FOR UPDATE"
        ))
        .bind(key.warehouse_id.as_str())
        .bind(key.code.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_batch", e))?;
        let batch = row
            .map(|r| batch_from_row(&r))
            .transpose()?
            .ok_or_else(|| StoreError::NotFound(format!("batch '{key}'")))?;
        if !expected.matches(Some(batch.version)) {
            return Err(StoreError::version_mismatch(key, expected, Some(batch.version)));
        }

        sqlx::query("DELETE FROM batches WHERE warehouse_id = $1 AND code = $2")
            .bind(key.warehouse_id.as_str())
            .bind(key.code.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("purge_batch", e))?;
        refresh_total(&mut tx, &key.warehouse_id).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(batch)
    }

    async fn purge_warehouse_async(&self, warehouse_id: &WarehouseId) -> Result<PurgeSummary, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let batches = sqlx::query("DELETE FROM batches WHERE warehouse_id = $1")
            .bind(warehouse_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("purge_batches", e))?
            .rows_affected();
        let transactions = sqlx::query("DELETE FROM ledger_transactions WHERE warehouse_id = $1")
            .bind(warehouse_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("purge_transactions", e))?
            .rows_affected();
        sqlx::query("DELETE FROM warehouse_totals WHERE warehouse_id = $1")
            .bind(warehouse_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("purge_totals", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(PurgeSummary {
            batches: batches as usize,
            transactions: transactions as usize,
        })
    }

    async fn upsert_intent(&self, intent: &TransferIntent, insert_only: bool) -> Result<(), StoreError> {
        let body = serde_json::to_value(intent)
            .map_err(|e| StoreError::Backend(format!("intent serialization failed: {e}")))?;
        let sql = if insert_only {
            "INSERT INTO transfer_intents (id, status, body, created_at, updated_at) VALUES ($1, $2, $3, $4, $5)"
        } else {
            "UPDATE transfer_intents SET status = $2, body = $3, updated_at = $5 WHERE id = $1 AND created_at = $4"
        };
        let result = sqlx::query(sql)
            .bind(intent.id.as_str())
            .bind(intent.status.as_str())
            .bind(&body)
            .bind(intent.created_at)
            .bind(intent.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::AlreadyExists(format!("transfer '{}'", intent.id))
                } else {
                    map_sqlx_error("save_intent", e)
                }
            })?;
        if !insert_only && result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("transfer '{}'", intent.id)));
        }
        Ok(())
    }
}

async fn insert_batch(tx: &mut sqlx::Transaction<'_, Postgres>, batch: &Batch) -> Result<(), StoreError> {
    sqlx::query(&format!(
        "INSERT INTO batches ({BATCH_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
    ))
    .bind(batch.warehouse_id.as_str())
    .bind(batch.code.as_str())
    .bind(batch.product.as_str())
    .bind(&batch.product_ref)
    .bind(batch.quantity)
    .bind(&batch.unit)
    .bind(batch.expiry_date)
    .bind(&batch.reason)
    .bind(&batch.category)
    .bind(batch.created_by.as_str())
    .bind(batch.created_at)
    .bind(batch.version as i64)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_batch", e))?;
    Ok(())
}

async fn update_batch(tx: &mut sqlx::Transaction<'_, Postgres>, batch: &Batch) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE batches SET quantity = $3, expiry_date = $4, unit = $5, category = $6, version = $7 \
         WHERE warehouse_id = $1 AND code = $2",
    )
    .bind(batch.warehouse_id.as_str())
    .bind(batch.code.as_str())
    .bind(batch.quantity)
    .bind(batch.expiry_date)
    .bind(&batch.unit)
    .bind(&batch.category)
    .bind(batch.version as i64)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_batch", e))?;
    Ok(())
}

async fn refresh_total(tx: &mut sqlx::Transaction<'_, Postgres>, warehouse_id: &WarehouseId) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO warehouse_totals (warehouse_id, total_items)
        SELECT $1, COALESCE(SUM(quantity), 0)::BIGINT FROM batches WHERE warehouse_id = $1 AND quantity > 0
        ON CONFLICT (warehouse_id) DO UPDATE SET total_items = EXCLUDED.total_items
        "#,
    )
    .bind(warehouse_id.as_str())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("refresh_total", e))?;
    Ok(())
}

async fn insert_transaction(tx: &mut sqlx::Transaction<'_, Postgres>, record: &Transaction) -> Result<(), StoreError> {
    sqlx::query(&format!(
        "INSERT INTO ledger_transactions ({TRANSACTION_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
    ))
    .bind(record.warehouse_id.as_str())
    .bind(record.sequence as i64)
    .bind(record.id.as_str())
    .bind(record.kind.as_str())
    .bind(record.product.as_str())
    .bind(record.code.as_str())
    .bind(record.quantity)
    .bind(&record.unit)
    .bind(record.expiry_date)
    .bind(&record.reason)
    .bind(&record.category)
    .bind(record.by.as_str())
    .bind(record.timestamp)
    .bind(record.counterpart_warehouse.as_ref().map(|w| w.as_str()))
    .bind(record.previous_quantity)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_transaction", e))?;
    Ok(())
}

fn column<T>(row: &PgRow, name: &str) -> Result<T, StoreError>
where
    T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Backend(format!("failed to read column '{name}': {e}")))
}

fn parsed<T>(value: String, what: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| StoreError::Backend(format!("stored {what} is invalid: {e}")))
}

fn batch_from_row(row: &PgRow) -> Result<Batch, StoreError> {
    Ok(Batch {
        warehouse_id: parsed::<WarehouseId>(column(row, "warehouse_id")?, "warehouse id")?,
        code: parsed::<BatchCode>(column(row, "code")?, "batch code")?,
        product: parsed::<ProductName>(column(row, "product")?, "product")?,
        product_ref: column(row, "product_ref")?,
        quantity: column(row, "quantity")?,
        unit: column(row, "unit")?,
        expiry_date: column::<Option<NaiveDate>>(row, "expiry_date")?,
        reason: column(row, "reason")?,
        category: column(row, "category")?,
        created_by: parsed::<ActorName>(column(row, "created_by")?, "actor")?,
        created_at: column::<DateTime<Utc>>(row, "created_at")?,
        version: column::<i64>(row, "version")? as u64,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction, StoreError> {
    let kind: String = column(row, "kind")?;
    let counterpart: Option<String> = column(row, "counterpart_warehouse")?;
    Ok(Transaction {
        id: TransactionId::from_stored(column::<String>(row, "id")?),
        kind: TransactionType::parse(&kind)
            .ok_or_else(|| StoreError::Backend(format!("stored transaction type '{kind}' is invalid")))?,
        warehouse_id: parsed::<WarehouseId>(column(row, "warehouse_id")?, "warehouse id")?,
        product: parsed::<ProductName>(column(row, "product")?, "product")?,
        code: parsed::<BatchCode>(column(row, "code")?, "batch code")?,
        quantity: column(row, "quantity")?,
        unit: column(row, "unit")?,
        expiry_date: column::<Option<NaiveDate>>(row, "expiry_date")?,
        reason: column(row, "reason")?,
        category: column(row, "category")?,
        by: parsed::<ActorName>(column(row, "actor")?, "actor")?,
        timestamp: column::<DateTime<Utc>>(row, "occurred_at")?,
        counterpart_warehouse: counterpart
            .map(|w| parsed::<WarehouseId>(w, "counterpart warehouse"))
            .transpose()?,
        previous_quantity: column::<Option<i64>>(row, "previous_quantity")?,
        sequence: column::<i64>(row, "sequence")? as u64,
    })
}

fn intent_from_row(row: &PgRow) -> Result<TransferIntent, StoreError> {
    let body: serde_json::Value = column(row, "body")?;
    serde_json::from_value(body).map_err(|e| StoreError::Backend(format!("stored transfer intent is invalid: {e}")))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Unique violation: a concurrent writer created the same row first.
                Some("23505") => StoreError::Conflict(msg),
                // Serialization failure / deadlock detected.
                Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                // Numeric value out of range: a warehouse total past BIGINT.
                Some("22003") => StoreError::Rejected(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some("23505");
    }
    false
}

impl BatchStore for PostgresLedgerStore {
    fn batches(&self, warehouse_id: &WarehouseId) -> Result<Vec<Batch>, StoreError> {
        self.block_on(self.fetch_batches(warehouse_id))
    }

    fn batch(&self, key: &BatchKey) -> Result<Option<Batch>, StoreError> {
        self.block_on(self.fetch_batch(key))
    }

    fn total_items(&self, warehouse_id: &WarehouseId) -> Result<i64, StoreError> {
        self.block_on(async {
            let total: Option<i64> =
                sqlx::query_scalar("SELECT total_items FROM warehouse_totals WHERE warehouse_id = $1")
                    .bind(warehouse_id.as_str())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("total_items", e))?;
            Ok(total.unwrap_or(0))
        })
    }

    fn upsert_quantity(&self, key: &BatchKey, delta: i64, seed: Option<Batch>) -> Result<Batch, StoreError> {
        self.block_on(self.write_one(BatchWrite::Adjust {
            key: key.clone(),
            expected: ExpectedVersion::Any,
            delta,
            seed,
        }))
    }

    fn set_quantity(&self, key: &BatchKey, quantity: i64) -> Result<Batch, StoreError> {
        self.block_on(async {
            let current = self
                .fetch_batch(key)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("batch '{key}'")))?;
            self.write_one(BatchWrite::Set {
                key: key.clone(),
                expected: ExpectedVersion::Any,
                quantity,
                expiry_date: current.expiry_date,
            })
            .await
        })
    }

    fn purge_batch(&self, key: &BatchKey, expected: ExpectedVersion) -> Result<Batch, StoreError> {
        self.block_on(self.purge_batch_async(key, expected))
    }

    fn refresh_product_attributes(
        &self,
        product: &ProductName,
        unit: &str,
        category: &str,
    ) -> Result<usize, StoreError> {
        self.block_on(async {
            let result = sqlx::query(
                "UPDATE batches SET unit = $2, category = $3, version = version + 1 \
                 WHERE product = $1 AND (unit <> $2 OR category <> $3)",
            )
            .bind(product.as_str())
            .bind(unit)
            .bind(category)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("refresh_product_attributes", e))?;
            Ok(result.rows_affected() as usize)
        })
    }
}

impl TransactionLog for PostgresLedgerStore {
    fn transactions(&self, warehouse_id: &WarehouseId) -> Result<Vec<Transaction>, StoreError> {
        self.block_on(self.fetch_transactions(Some(warehouse_id)))
    }

    fn transaction_count(&self, warehouse_id: &WarehouseId) -> Result<u64, StoreError> {
        self.block_on(async {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ledger_transactions WHERE warehouse_id = $1")
                .bind(warehouse_id.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("transaction_count", e))?;
            Ok(count as u64)
        })
    }

    fn contains_transaction(&self, warehouse_id: &WarehouseId, id: &TransactionId) -> Result<bool, StoreError> {
        self.block_on(async {
            let found: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM ledger_transactions WHERE warehouse_id = $1 AND id = $2)",
            )
            .bind(warehouse_id.as_str())
            .bind(id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("contains_transaction", e))?;
            Ok(found)
        })
    }

    fn all_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        self.block_on(self.fetch_transactions(None))
    }
}

impl TransferJournal for PostgresLedgerStore {
    fn record_intent(&self, intent: &TransferIntent) -> Result<(), StoreError> {
        self.block_on(self.upsert_intent(intent, true))
    }

    fn save_intent(&self, intent: &TransferIntent) -> Result<(), StoreError> {
        self.block_on(self.upsert_intent(intent, false))
    }

    fn load_intent(&self, id: &TransactionId) -> Result<Option<TransferIntent>, StoreError> {
        self.block_on(async {
            let row = sqlx::query("SELECT body FROM transfer_intents WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("load_intent", e))?;
            row.map(|r| intent_from_row(&r)).transpose()
        })
    }

    fn open_intents(&self) -> Result<Vec<TransferIntent>, StoreError> {
        self.block_on(async {
            let rows = sqlx::query(
                "SELECT body FROM transfer_intents WHERE status IN ('pending', 'debited') ORDER BY created_at ASC",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("open_intents", e))?;
            rows.iter().map(intent_from_row).collect()
        })
    }
}

impl LedgerStore for PostgresLedgerStore {
    fn atomicity(&self) -> Atomicity {
        Atomicity::MultiKey
    }

    fn commit(&self, changeset: Changeset) -> Result<Vec<Transaction>, StoreError> {
        self.block_on(self.commit_async(changeset))
    }

    fn purge_warehouse(&self, warehouse_id: &WarehouseId) -> Result<PurgeSummary, StoreError> {
        self.block_on(self.purge_warehouse_async(warehouse_id))
    }
}
