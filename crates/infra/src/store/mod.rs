//! Ledger storage boundary.
//!
//! Three narrow traits describe what the engine reads and writes:
//!
//! - [`BatchStore`]: current state, one record per `(warehouse, code)`
//! - [`TransactionLog`]: append-only per-warehouse history
//! - [`TransferJournal`]: intents of transfers executed as separate commits
//!
//! [`LedgerStore`] ties them together and adds [`LedgerStore::commit`], which
//! applies a [`Changeset`] (conditional batch writes plus the transaction
//! records describing them) all-or-nothing.
//!
//! Stores are synchronous. Reads are not linearizable with concurrent writes
//! on every backend; callers that need a fresh view re-query after a commit.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use thiserror::Error;

use stockledger_core::{DomainError, ExpectedVersion, ProductName, WarehouseId};
use stockledger_ledger::{Batch, BatchKey, Changeset, Transaction, TransactionId, TransferIntent};

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;

/// Which changesets a store can commit atomically.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Atomicity {
    /// Only changesets that touch a single batch key (document-store semantics).
    SingleKey,
    /// Any changeset, across warehouses.
    MultiKey,
}

/// Storage operation error.
///
/// These are infrastructure failures; the engine maps them onto the ledger's
/// caller-facing taxonomy.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A conditional write lost a race; nothing was written.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// A quantity change would leave the batch below zero; nothing was written.
    #[error("batch '{key}' would go negative: available {available}, requested {requested}")]
    WouldGoNegative {
        key: String,
        available: i64,
        requested: i64,
    },

    /// The ledger rules refused the write, e.g. a quantity out of range.
    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Translate a rejected write computed by the shared write rules.
    pub(crate) fn from_write(key: &BatchKey, err: DomainError) -> Self {
        match err {
            DomainError::InsufficientStock {
                available,
                requested,
            } => StoreError::WouldGoNegative {
                key: key.to_string(),
                available,
                requested,
            },
            DomainError::DuplicateBatch { .. } => StoreError::AlreadyExists(format!("batch '{key}'")),
            DomainError::NotFound(what) => StoreError::NotFound(what),
            DomainError::Validation(msg) => StoreError::Rejected(msg),
            other => StoreError::Backend(other.to_string()),
        }
    }

    pub(crate) fn version_mismatch(key: &BatchKey, expected: ExpectedVersion, actual: Option<u64>) -> Self {
        StoreError::Conflict(format!(
            "batch '{key}' expected {expected:?}, found {actual:?}"
        ))
    }
}

/// What a warehouse purge removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PurgeSummary {
    pub batches: usize,
    pub transactions: usize,
}

/// Current-state table of batches.
pub trait BatchStore: Send + Sync {
    /// Every batch of a warehouse (zero-quantity records included), ordered by code.
    fn batches(&self, warehouse_id: &WarehouseId) -> Result<Vec<Batch>, StoreError>;

    fn batch(&self, key: &BatchKey) -> Result<Option<Batch>, StoreError>;

    /// Sum of positive batch quantities, as persisted on the last write.
    fn total_items(&self, warehouse_id: &WarehouseId) -> Result<i64, StoreError>;

    /// Add `delta` to a batch, creating it from `seed` when absent.
    ///
    /// Unconditional (no version check); refuses to go below zero.
    fn upsert_quantity(&self, key: &BatchKey, delta: i64, seed: Option<Batch>) -> Result<Batch, StoreError>;

    /// Overwrite a batch's quantity. Unconditional; refuses negative values.
    fn set_quantity(&self, key: &BatchKey, quantity: i64) -> Result<Batch, StoreError>;

    /// Remove a batch record if it is still at `expected`.
    fn purge_batch(&self, key: &BatchKey, expected: ExpectedVersion) -> Result<Batch, StoreError>;

    /// Rewrite unit/category on every batch of `product`; returns how many changed.
    fn refresh_product_attributes(
        &self,
        product: &ProductName,
        unit: &str,
        category: &str,
    ) -> Result<usize, StoreError>;
}

/// Append-only history of ledger mutations.
pub trait TransactionLog: Send + Sync {
    /// One warehouse's records in append order.
    fn transactions(&self, warehouse_id: &WarehouseId) -> Result<Vec<Transaction>, StoreError>;

    fn transaction_count(&self, warehouse_id: &WarehouseId) -> Result<u64, StoreError>;

    fn contains_transaction(&self, warehouse_id: &WarehouseId, id: &TransactionId) -> Result<bool, StoreError>;

    /// Records of every warehouse, newest first.
    fn all_transactions(&self) -> Result<Vec<Transaction>, StoreError>;
}

/// Persisted transfer intents.
pub trait TransferJournal: Send + Sync {
    /// Record a new intent; an existing id is `AlreadyExists`.
    fn record_intent(&self, intent: &TransferIntent) -> Result<(), StoreError>;

    /// Replace a recorded intent.
    fn save_intent(&self, intent: &TransferIntent) -> Result<(), StoreError>;

    fn load_intent(&self, id: &TransactionId) -> Result<Option<TransferIntent>, StoreError>;

    /// Intents still `Pending` or `Debited`, oldest first.
    fn open_intents(&self) -> Result<Vec<TransferIntent>, StoreError>;
}

/// Full ledger storage.
pub trait LedgerStore: BatchStore + TransactionLog + TransferJournal {
    fn atomicity(&self) -> Atomicity;

    /// Apply every write and append every record, or nothing.
    ///
    /// Each write's `ExpectedVersion` is checked against the stored batch;
    /// a mismatch fails the whole changeset with [`StoreError::Conflict`].
    /// Returns the appended records with their log sequence assigned.
    fn commit(&self, changeset: Changeset) -> Result<Vec<Transaction>, StoreError>;

    /// Remove all batches, totals and history of a warehouse.
    fn purge_warehouse(&self, warehouse_id: &WarehouseId) -> Result<PurgeSummary, StoreError>;
}

impl<S> BatchStore for Arc<S>
where
    S: BatchStore + ?Sized,
{
    fn batches(&self, warehouse_id: &WarehouseId) -> Result<Vec<Batch>, StoreError> {
        (**self).batches(warehouse_id)
    }

    fn batch(&self, key: &BatchKey) -> Result<Option<Batch>, StoreError> {
        (**self).batch(key)
    }

    fn total_items(&self, warehouse_id: &WarehouseId) -> Result<i64, StoreError> {
        (**self).total_items(warehouse_id)
    }

    fn upsert_quantity(&self, key: &BatchKey, delta: i64, seed: Option<Batch>) -> Result<Batch, StoreError> {
        (**self).upsert_quantity(key, delta, seed)
    }

    fn set_quantity(&self, key: &BatchKey, quantity: i64) -> Result<Batch, StoreError> {
        (**self).set_quantity(key, quantity)
    }

    fn purge_batch(&self, key: &BatchKey, expected: ExpectedVersion) -> Result<Batch, StoreError> {
        (**self).purge_batch(key, expected)
    }

    fn refresh_product_attributes(
        &self,
        product: &ProductName,
        unit: &str,
        category: &str,
    ) -> Result<usize, StoreError> {
        (**self).refresh_product_attributes(product, unit, category)
    }
}

impl<S> TransactionLog for Arc<S>
where
    S: TransactionLog + ?Sized,
{
    fn transactions(&self, warehouse_id: &WarehouseId) -> Result<Vec<Transaction>, StoreError> {
        (**self).transactions(warehouse_id)
    }

    fn transaction_count(&self, warehouse_id: &WarehouseId) -> Result<u64, StoreError> {
        (**self).transaction_count(warehouse_id)
    }

    fn contains_transaction(&self, warehouse_id: &WarehouseId, id: &TransactionId) -> Result<bool, StoreError> {
        (**self).contains_transaction(warehouse_id, id)
    }

    fn all_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        (**self).all_transactions()
    }
}

impl<S> TransferJournal for Arc<S>
where
    S: TransferJournal + ?Sized,
{
    fn record_intent(&self, intent: &TransferIntent) -> Result<(), StoreError> {
        (**self).record_intent(intent)
    }

    fn save_intent(&self, intent: &TransferIntent) -> Result<(), StoreError> {
        (**self).save_intent(intent)
    }

    fn load_intent(&self, id: &TransactionId) -> Result<Option<TransferIntent>, StoreError> {
        (**self).load_intent(id)
    }

    fn open_intents(&self) -> Result<Vec<TransferIntent>, StoreError> {
        (**self).open_intents()
    }
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn atomicity(&self) -> Atomicity {
        (**self).atomicity()
    }

    fn commit(&self, changeset: Changeset) -> Result<Vec<Transaction>, StoreError> {
        (**self).commit(changeset)
    }

    fn purge_warehouse(&self, warehouse_id: &WarehouseId) -> Result<PurgeSummary, StoreError> {
        (**self).purge_warehouse(warehouse_id)
    }
}
