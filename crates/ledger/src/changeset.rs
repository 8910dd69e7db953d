//! Conditional writes decided by the rules and committed by a store.

use chrono::NaiveDate;

use stockledger_core::ExpectedVersion;

use crate::batch::{Batch, BatchKey};
use crate::transaction::Transaction;

/// One conditional write against a single batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchWrite {
    /// Create a batch that must not exist yet.
    Create(Batch),
    /// Add `delta` to the quantity. When the batch is absent and `seed` is
    /// given, the seed is created with `delta` as its quantity.
    Adjust {
        key: BatchKey,
        expected: ExpectedVersion,
        delta: i64,
        seed: Option<Batch>,
    },
    /// Overwrite quantity and expiry (direct correction).
    Set {
        key: BatchKey,
        expected: ExpectedVersion,
        quantity: i64,
        expiry_date: Option<NaiveDate>,
    },
}

impl BatchWrite {
    pub fn key(&self) -> BatchKey {
        match self {
            BatchWrite::Create(batch) => batch.key(),
            BatchWrite::Adjust { key, .. } | BatchWrite::Set { key, .. } => key.clone(),
        }
    }

    pub fn expected(&self) -> ExpectedVersion {
        match self {
            BatchWrite::Create(_) => ExpectedVersion::Absent,
            BatchWrite::Adjust { expected, .. } | BatchWrite::Set { expected, .. } => *expected,
        }
    }
}

/// Batch writes plus the transaction records describing them.
///
/// A store applies a changeset all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    pub writes: Vec<BatchWrite>,
    pub transactions: Vec<Transaction>,
}

impl Changeset {
    pub fn new(writes: Vec<BatchWrite>, transactions: Vec<Transaction>) -> Self {
        Self { writes, transactions }
    }

    pub fn single(write: BatchWrite, transaction: Transaction) -> Self {
        Self::new(vec![write], vec![transaction])
    }

    /// Concatenate two changesets into one (used when the store can commit
    /// several keys atomically).
    pub fn merge(mut self, other: Changeset) -> Self {
        self.writes.extend(other.writes);
        self.transactions.extend(other.transactions);
        self
    }

    /// Distinct batch keys written, in write order.
    pub fn keys(&self) -> Vec<BatchKey> {
        let mut keys: Vec<BatchKey> = Vec::with_capacity(self.writes.len());
        for w in &self.writes {
            let key = w.key();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}
