//! Decision rules: validate a command against the current batch state and
//! describe the resulting writes as a [`Changeset`].
//!
//! Every rule is a pure function of its inputs. The caller reads the batches,
//! calls a rule, and commits the changeset; the `ExpectedVersion`s embedded in
//! the writes make the commit fail if a batch changed in between.

use chrono::{DateTime, Utc};

use stockledger_core::{DomainError, DomainResult, ExpectedVersion, WarehouseId};

use crate::batch::{Batch, BatchKey};
use crate::changeset::{BatchWrite, Changeset};
use crate::command::{EditBatch, StockIn, StockOut, Transfer};
use crate::transaction::{Transaction, TransactionType};
use crate::transfer::TransferIntent;
use crate::txid::TransactionId;

pub const REVERSAL_REASON: &str = "Transfer reversal";

/// Product attributes copied into batches and transaction records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSnapshot {
    pub product_ref: String,
    pub unit: String,
    pub category: String,
}

impl ProductSnapshot {
    /// Attributes carried by an existing batch (used when the catalog entry is gone).
    pub fn of_batch(batch: &Batch) -> Self {
        Self {
            product_ref: batch.product_ref.clone(),
            unit: batch.unit.clone(),
            category: batch.category.clone(),
        }
    }
}

/// The two halves of a transfer plus the intent describing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub intent: TransferIntent,
    pub debit: Changeset,
    pub credit: Changeset,
}

impl TransferPlan {
    /// Both halves as one changeset, for stores that commit several keys atomically.
    pub fn combined(&self) -> Changeset {
        self.debit.clone().merge(self.credit.clone())
    }
}

fn missing_batch(key: &BatchKey) -> DomainError {
    DomainError::not_found(format!("batch '{key}'"))
}

/// Resolve the batch a decrease applies to and check it can cover `quantity`.
fn debitable<'a>(
    key: &BatchKey,
    batch: Option<&'a Batch>,
    product: &stockledger_core::ProductName,
    quantity: i64,
) -> DomainResult<&'a Batch> {
    let batch = batch.ok_or_else(|| missing_batch(key))?;
    if &batch.product != product {
        return Err(DomainError::not_found(format!(
            "batch '{key}' of product '{product}'"
        )));
    }
    if quantity > batch.quantity {
        return Err(DomainError::insufficient(batch.quantity, quantity));
    }
    Ok(batch)
}

/// Stock-in: always creates a new batch identity.
pub fn receive(cmd: &StockIn, existing: Option<&Batch>, product: &ProductSnapshot) -> DomainResult<Changeset> {
    cmd.validate()?;
    if existing.is_some() {
        return Err(DomainError::DuplicateBatch {
            warehouse: cmd.warehouse_id.to_string(),
            code: cmd.code.to_string(),
        });
    }

    let batch = Batch {
        warehouse_id: cmd.warehouse_id.clone(),
        code: cmd.code.clone(),
        product: cmd.product.clone(),
        product_ref: product.product_ref.clone(),
        quantity: cmd.quantity,
        unit: product.unit.clone(),
        expiry_date: cmd.expiry_date,
        reason: cmd.reason.clone(),
        category: product.category.clone(),
        created_by: cmd.actor.clone(),
        created_at: cmd.occurred_at,
        version: 0,
    };
    let tx = Transaction {
        id: TransactionId::stock_in(&cmd.warehouse_id, &cmd.code, &cmd.reason, cmd.occurred_at),
        kind: TransactionType::StockIn,
        warehouse_id: cmd.warehouse_id.clone(),
        product: cmd.product.clone(),
        code: cmd.code.clone(),
        quantity: cmd.quantity,
        unit: product.unit.clone(),
        expiry_date: cmd.expiry_date,
        reason: cmd.reason.clone(),
        category: product.category.clone(),
        by: cmd.actor.clone(),
        timestamp: cmd.occurred_at,
        counterpart_warehouse: None,
        previous_quantity: None,
        sequence: 0,
    };
    Ok(Changeset::single(BatchWrite::Create(batch), tx))
}

/// Stock-out: decrease an existing batch; it may reach exactly zero.
pub fn issue(cmd: &StockOut, batch: Option<&Batch>, product: &ProductSnapshot) -> DomainResult<Changeset> {
    cmd.validate()?;
    let key = BatchKey::new(cmd.warehouse_id.clone(), cmd.code.clone());
    let batch = debitable(&key, batch, &cmd.product, cmd.quantity)?;

    let tx = Transaction {
        id: TransactionId::stock_out(&cmd.warehouse_id, &cmd.code, &cmd.reason, cmd.occurred_at),
        kind: TransactionType::StockOut,
        warehouse_id: cmd.warehouse_id.clone(),
        product: cmd.product.clone(),
        code: cmd.code.clone(),
        quantity: cmd.quantity,
        unit: product.unit.clone(),
        expiry_date: batch.expiry_date,
        reason: cmd.reason.clone(),
        category: product.category.clone(),
        by: cmd.actor.clone(),
        timestamp: cmd.occurred_at,
        counterpart_warehouse: None,
        previous_quantity: None,
        sequence: 0,
    };
    let write = BatchWrite::Adjust {
        key,
        expected: ExpectedVersion::of(Some(batch)),
        delta: -cmd.quantity,
        seed: None,
    };
    Ok(Changeset::single(write, tx))
}

/// Transfer: debit the source, credit (or create) the same code at the destination.
pub fn plan_transfer(
    cmd: &Transfer,
    source: Option<&Batch>,
    destination: Option<&Batch>,
    product: &ProductSnapshot,
) -> DomainResult<TransferPlan> {
    cmd.validate()?;
    let source_key = BatchKey::new(cmd.from.clone(), cmd.code.clone());
    let source = debitable(&source_key, source, &cmd.product, cmd.quantity)?;

    let intent = TransferIntent::new(cmd, source, &product.unit, &product.category);
    let debit = debit_source(&intent, source);
    let credit = credit_destination(&intent, destination)?;
    Ok(TransferPlan {
        intent,
        debit,
        credit,
    })
}

fn debit_source(intent: &TransferIntent, source: &Batch) -> Changeset {
    let tx = Transaction {
        id: intent.id.clone(),
        kind: TransactionType::TransferOut,
        warehouse_id: intent.from.clone(),
        product: intent.product.clone(),
        code: intent.code.clone(),
        quantity: intent.quantity,
        unit: intent.unit.clone(),
        expiry_date: intent.expiry_date,
        reason: intent.reason.clone(),
        category: intent.category.clone(),
        by: intent.actor.clone(),
        timestamp: intent.occurred_at,
        counterpart_warehouse: Some(intent.to.clone()),
        previous_quantity: None,
        sequence: 0,
    };
    let write = BatchWrite::Adjust {
        key: intent.source_key(),
        expected: ExpectedVersion::of(Some(source)),
        delta: -intent.quantity,
        seed: None,
    };
    Changeset::single(write, tx)
}

/// Credit side of a transfer: merge into the destination batch with the same
/// code, or create it from the intent's snapshot.
pub fn credit_destination(intent: &TransferIntent, destination: Option<&Batch>) -> DomainResult<Changeset> {
    let tx = Transaction {
        id: intent.transfer_in_id(),
        kind: TransactionType::TransferIn,
        warehouse_id: intent.to.clone(),
        product: intent.product.clone(),
        code: intent.code.clone(),
        quantity: intent.quantity,
        unit: intent.unit.clone(),
        expiry_date: intent.expiry_date,
        reason: intent.reason.clone(),
        category: intent.category.clone(),
        by: intent.actor.clone(),
        timestamp: intent.occurred_at,
        counterpart_warehouse: Some(intent.from.clone()),
        previous_quantity: None,
        sequence: 0,
    };
    let write = credit_write(intent, &intent.to, destination)?;
    Ok(Changeset::single(write, tx))
}

/// Undo a debited transfer by putting the quantity back at the source.
///
/// Recorded as a `transferIn` from the original destination so the source log
/// balances without rewriting the original `transferOut`.
pub fn compensate(intent: &TransferIntent, source: Option<&Batch>, at: DateTime<Utc>) -> DomainResult<Changeset> {
    let tx = Transaction {
        id: TransactionId::transfer_in(&intent.from, &intent.code, &intent.to, at),
        kind: TransactionType::TransferIn,
        warehouse_id: intent.from.clone(),
        product: intent.product.clone(),
        code: intent.code.clone(),
        quantity: intent.quantity,
        unit: intent.unit.clone(),
        expiry_date: intent.expiry_date,
        reason: REVERSAL_REASON.to_string(),
        category: intent.category.clone(),
        by: intent.actor.clone(),
        timestamp: at,
        counterpart_warehouse: Some(intent.to.clone()),
        previous_quantity: None,
        sequence: 0,
    };
    let write = credit_write(intent, &intent.from, source)?;
    Ok(Changeset::single(write, tx))
}

fn credit_write(intent: &TransferIntent, at: &WarehouseId, current: Option<&Batch>) -> DomainResult<BatchWrite> {
    let key = BatchKey::new(at.clone(), intent.code.clone());
    match current {
        Some(batch) if batch.product != intent.product => Err(DomainError::invariant(format!(
            "batch '{key}' holds '{}', cannot merge '{}'",
            batch.product, intent.product
        ))),
        Some(batch) => Ok(BatchWrite::Adjust {
            key,
            expected: ExpectedVersion::of(Some(batch)),
            delta: intent.quantity,
            seed: None,
        }),
        None => Ok(BatchWrite::Create(intent.seed_batch(at))),
    }
}

/// Direct edit: set quantity and expiry, keeping the batch identity.
pub fn correct(cmd: &EditBatch, batch: Option<&Batch>, product: &ProductSnapshot) -> DomainResult<Changeset> {
    cmd.validate()?;
    let key = BatchKey::new(cmd.warehouse_id.clone(), cmd.code.clone());
    let batch = batch.ok_or_else(|| missing_batch(&key))?;

    let tx = Transaction {
        id: TransactionId::edit(&cmd.warehouse_id, &cmd.code, &cmd.reason, cmd.occurred_at),
        kind: TransactionType::Edit,
        warehouse_id: cmd.warehouse_id.clone(),
        product: batch.product.clone(),
        code: cmd.code.clone(),
        quantity: cmd.quantity,
        unit: product.unit.clone(),
        expiry_date: cmd.expiry_date,
        reason: cmd.reason.clone(),
        category: product.category.clone(),
        by: cmd.actor.clone(),
        timestamp: cmd.occurred_at,
        counterpart_warehouse: None,
        previous_quantity: Some(batch.quantity),
        sequence: 0,
    };
    let write = BatchWrite::Set {
        key,
        expected: ExpectedVersion::of(Some(batch)),
        quantity: cmd.quantity,
        expiry_date: cmd.expiry_date,
    };
    Ok(Changeset::single(write, tx))
}

/// Apply a changeset's writes to an in-memory view of batches.
///
/// Used by tests and by stores to compute the post-commit state. Returns the
/// updated batches in write order; version checks are the caller's concern.
pub fn apply_write(current: Option<&Batch>, write: &BatchWrite) -> DomainResult<Batch> {
    match (write, current) {
        (BatchWrite::Create(_), Some(existing)) => Err(DomainError::DuplicateBatch {
            warehouse: existing.warehouse_id.to_string(),
            code: existing.code.to_string(),
        }),
        (BatchWrite::Create(batch), None) => {
            if batch.quantity < 0 {
                return Err(DomainError::insufficient(0, -batch.quantity));
            }
            let mut created = batch.clone();
            created.version = 1;
            Ok(created)
        }
        (BatchWrite::Adjust { delta, .. }, Some(existing)) => {
            let quantity = existing
                .quantity
                .checked_add(*delta)
                .ok_or_else(|| DomainError::validation(format!("quantity of batch '{}' would overflow", existing.code)))?;
            if quantity < 0 {
                return Err(DomainError::insufficient(existing.quantity, -delta));
            }
            let mut next = existing.clone();
            next.quantity = quantity;
            next.version += 1;
            Ok(next)
        }
        (BatchWrite::Adjust { key, delta, seed, .. }, None) => match seed {
            Some(seed) if *delta >= 0 => {
                let mut created = seed.clone();
                created.warehouse_id = key.warehouse_id.clone();
                created.code = key.code.clone();
                created.quantity = *delta;
                created.version = 1;
                Ok(created)
            }
            Some(_) => Err(DomainError::insufficient(0, -delta)),
            None => Err(missing_batch(key)),
        },
        (BatchWrite::Set { quantity, expiry_date, .. }, Some(existing)) => {
            if *quantity < 0 {
                return Err(DomainError::validation("quantity cannot be negative"));
            }
            let mut next = existing.clone();
            next.quantity = *quantity;
            next.expiry_date = *expiry_date;
            next.version += 1;
            Ok(next)
        }
        (BatchWrite::Set { key, .. }, None) => Err(missing_batch(key)),
    }
}
