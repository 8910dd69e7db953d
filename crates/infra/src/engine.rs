//! Ledger operation pipeline.
//!
//! Every mutating operation follows the same cycle:
//!
//! ```text
//! Command
//!   ↓
//! 1. Validate input and resolve warehouse/product references
//!   ↓
//! 2. Read the batches involved (each read carries its version)
//!   ↓
//! 3. Decide (pure rule → Changeset of conditional writes + transaction records)
//!   ↓
//! 4. Commit (all-or-nothing; stale versions fail with a conflict)
//!   ↓
//! 5. Publish change notifications (best-effort)
//! ```
//!
//! A conflict at step 4 means nothing was written, so the engine goes back to
//! step 2 up to `max_conflict_retries` times. Any other failed write is
//! reported to the caller and never retried here.
//!
//! Transfers commit both sides at once when the store is
//! [`Atomicity::MultiKey`]. On a [`Atomicity::SingleKey`] store they run as a
//! saga over a persisted [`TransferIntent`]: debit the source first, then
//! credit the destination. A failed credit is reported as
//! [`LedgerError::PartialTransfer`] and left for an operator to resume or
//! compensate.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use stockledger_catalog::{ProductCatalog, WarehouseRegistry};
use stockledger_core::{BatchCode, DomainError, ExpectedVersion, ProductName, WarehouseId};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_ledger::rules::{self, ProductSnapshot, TransferPlan};
use stockledger_ledger::{
    Batch, BatchKey, Changeset, EditBatch, LedgerEvent, StockIn, StockOut, Transaction, TransactionId,
    TransactionType, Transfer, TransferIntent, TransferStatus,
};

use crate::config::{DuplicateSubmissionPolicy, LedgerConfig};
use crate::error::LedgerError;
use crate::low_stock::LowStockEvaluator;
use crate::store::{Atomicity, LedgerStore, PurgeSummary, StoreError};

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Both records written by a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub intent_id: TransactionId,
    pub transfer_out: Transaction,
    pub transfer_in: Transaction,
}

/// Calendar filter over the global history (UTC).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

impl HistoryFilter {
    fn validate(&self) -> LedgerResult<()> {
        match self.month {
            Some(m) if !(1..=12).contains(&m) => Err(LedgerError::Validation(format!(
                "month must be between 1 and 12, got {m}"
            ))),
            _ => Ok(()),
        }
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        use chrono::Datelike;

        match (self.year, self.month) {
            (Some(y), Some(m)) => tx.in_month(y, m),
            (Some(y), None) => tx.timestamp.year() == y,
            (None, Some(m)) => tx.timestamp.month() == m,
            (None, None) => true,
        }
    }
}

/// Orchestrates stock-in, stock-out, transfer and edit against a [`LedgerStore`].
pub struct LedgerEngine<S, B> {
    store: S,
    bus: B,
    warehouses: Arc<dyn WarehouseRegistry>,
    products: Arc<dyn ProductCatalog>,
    config: LedgerConfig,
}

impl<S, B> LedgerEngine<S, B> {
    pub fn new(
        store: S,
        bus: B,
        warehouses: Arc<dyn WarehouseRegistry>,
        products: Arc<dyn ProductCatalog>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            bus,
            warehouses,
            products,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn warehouses(&self) -> &dyn WarehouseRegistry {
        self.warehouses.as_ref()
    }

    pub fn products(&self) -> &dyn ProductCatalog {
        self.products.as_ref()
    }
}

fn observe<T>(operation: &'static str, result: LedgerResult<T>) -> LedgerResult<T> {
    if let Err(err) = &result {
        if err.is_rejection() {
            debug!(operation, code = err.code(), error = %err, "ledger command rejected");
        } else {
            error!(operation, code = err.code(), error = %err, "ledger command failed");
        }
    }
    result
}

fn first_record(records: Vec<Transaction>) -> LedgerResult<Transaction> {
    records
        .into_iter()
        .next()
        .ok_or_else(|| LedgerError::Invariant("commit returned no transaction record".to_string()))
}

fn record_of(records: &[Transaction], kind: TransactionType) -> LedgerResult<Transaction> {
    records
        .iter()
        .find(|tx| tx.kind == kind)
        .cloned()
        .ok_or_else(|| LedgerError::Invariant(format!("commit returned no {} record", kind.as_str())))
}

impl<S, B> LedgerEngine<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<LedgerEvent>>,
{
    // ---- commands ----------------------------------------------------------

    /// Receive a new batch. The code must not exist in the warehouse yet.
    #[instrument(skip(self, cmd), fields(warehouse_id = %cmd.warehouse_id, code = %cmd.code, quantity = cmd.quantity))]
    pub fn stock_in(&self, cmd: StockIn) -> LedgerResult<Transaction> {
        observe("stock_in", self.try_stock_in(&cmd))
    }

    fn try_stock_in(&self, cmd: &StockIn) -> LedgerResult<Transaction> {
        cmd.validate()?;
        self.warehouses.require(&cmd.warehouse_id)?;
        let product = self.products.require(&cmd.product)?;
        let snapshot = ProductSnapshot {
            product_ref: product.name.to_string(),
            unit: product.unit,
            category: product.category,
        };
        let key = BatchKey::new(cmd.warehouse_id.clone(), cmd.code.clone());

        let records = self.with_retries("stock_in", || {
            let existing = self.store.batch(&key)?;
            let changeset = rules::receive(cmd, existing.as_ref(), &snapshot)?;
            self.commit_checked(changeset)
        })?;
        self.publish_recorded(&records);
        let tx = first_record(records)?;
        info!(transaction_id = %tx.id, "stock received");
        Ok(tx)
    }

    /// Issue quantity out of an existing batch.
    #[instrument(skip(self, cmd), fields(warehouse_id = %cmd.warehouse_id, code = %cmd.code, quantity = cmd.quantity))]
    pub fn stock_out(&self, cmd: StockOut) -> LedgerResult<Transaction> {
        observe("stock_out", self.try_stock_out(&cmd))
    }

    fn try_stock_out(&self, cmd: &StockOut) -> LedgerResult<Transaction> {
        cmd.validate()?;
        self.warehouses.require(&cmd.warehouse_id)?;
        let key = BatchKey::new(cmd.warehouse_id.clone(), cmd.code.clone());

        let records = self.with_retries("stock_out", || {
            let batch = self.store.batch(&key)?;
            let snapshot = self.snapshot_for(&cmd.product, batch.as_ref());
            let changeset = rules::issue(cmd, batch.as_ref(), &snapshot)?;
            self.commit_checked(changeset)
        })?;
        self.publish_recorded(&records);
        let tx = first_record(records)?;
        info!(transaction_id = %tx.id, "stock issued");
        Ok(tx)
    }

    /// Move quantity of a batch to the same code in another warehouse.
    #[instrument(skip(self, cmd), fields(from = %cmd.from, to = %cmd.to, code = %cmd.code, quantity = cmd.quantity))]
    pub fn transfer(&self, cmd: Transfer) -> LedgerResult<TransferReceipt> {
        observe("transfer", self.try_transfer(&cmd))
    }

    fn try_transfer(&self, cmd: &Transfer) -> LedgerResult<TransferReceipt> {
        cmd.validate()?;
        self.warehouses.require(&cmd.from)?;
        self.warehouses.require(&cmd.to)?;

        let receipt = match self.store.atomicity() {
            Atomicity::MultiKey => self.transfer_atomic(cmd)?,
            Atomicity::SingleKey => self.transfer_saga(cmd)?,
        };
        info!(intent_id = %receipt.intent_id, "transfer completed");
        Ok(receipt)
    }

    /// Correct a batch's quantity and expiry in place.
    #[instrument(skip(self, cmd), fields(warehouse_id = %cmd.warehouse_id, code = %cmd.code, quantity = cmd.quantity))]
    pub fn edit_batch(&self, cmd: EditBatch) -> LedgerResult<Transaction> {
        observe("edit_batch", self.try_edit_batch(&cmd))
    }

    fn try_edit_batch(&self, cmd: &EditBatch) -> LedgerResult<Transaction> {
        cmd.validate()?;
        self.warehouses.require(&cmd.warehouse_id)?;
        let key = BatchKey::new(cmd.warehouse_id.clone(), cmd.code.clone());

        let records = self.with_retries("edit_batch", || {
            let batch = self.store.batch(&key)?;
            let snapshot = match &batch {
                Some(b) => self.snapshot_for(&b.product, Some(b)),
                None => return Err(DomainError::not_found(format!("batch '{key}'")).into()),
            };
            let changeset = rules::correct(cmd, batch.as_ref(), &snapshot)?;
            self.commit_checked(changeset)
        })?;
        self.publish_recorded(&records);
        let tx = first_record(records)?;
        info!(transaction_id = %tx.id, previous = ?tx.previous_quantity, "batch corrected");
        Ok(tx)
    }

    /// Remove an empty batch record. Batches still holding stock are refused.
    #[instrument(skip(self))]
    pub fn purge_batch(&self, warehouse_id: &WarehouseId, code: &BatchCode) -> LedgerResult<Batch> {
        observe("purge_batch", self.try_purge_batch(warehouse_id, code))
    }

    fn try_purge_batch(&self, warehouse_id: &WarehouseId, code: &BatchCode) -> LedgerResult<Batch> {
        let key = BatchKey::new(warehouse_id.clone(), code.clone());
        let removed = self.with_retries("purge_batch", || {
            let batch = self
                .store
                .batch(&key)?
                .ok_or_else(|| LedgerError::NotFound(format!("batch '{key}'")))?;
            if batch.is_held() {
                return Err(LedgerError::Invariant(format!(
                    "batch '{key}' still holds {} {}; only empty batches can be purged",
                    batch.quantity, batch.unit
                )));
            }
            Ok(self.store.purge_batch(&key, ExpectedVersion::of(Some(&batch)))?)
        })?;

        let sequence = self.log_sequence(warehouse_id);
        self.publish(
            LedgerEvent::BatchPurged {
                warehouse_id: warehouse_id.clone(),
                code: code.clone(),
                occurred_at: Utc::now(),
            },
            sequence,
        );
        info!("empty batch purged");
        Ok(removed)
    }

    /// Copy a product's current unit/category onto its batches in every warehouse.
    ///
    /// Transaction records keep the attributes in effect when they were written.
    #[instrument(skip(self))]
    pub fn resync_product(&self, name: &ProductName) -> LedgerResult<usize> {
        observe("resync_product", self.try_resync_product(name))
    }

    fn try_resync_product(&self, name: &ProductName) -> LedgerResult<usize> {
        let product = self.products.require(name)?;
        let changed = self
            .store
            .refresh_product_attributes(name, &product.unit, &product.category)?;
        info!(changed, "product attributes copied to batches");
        Ok(changed)
    }

    /// Drop every batch, total and record of a warehouse.
    ///
    /// The registry entry is removed by the caller (see [`crate::maintenance`]).
    #[instrument(skip(self))]
    pub fn purge_warehouse(&self, warehouse_id: &WarehouseId) -> LedgerResult<PurgeSummary> {
        let summary = observe(
            "purge_warehouse",
            self.store.purge_warehouse(warehouse_id).map_err(LedgerError::from),
        )?;
        self.publish(
            LedgerEvent::WarehouseDeleted {
                warehouse_id: warehouse_id.clone(),
                occurred_at: Utc::now(),
            },
            0,
        );
        info!(batches = summary.batches, transactions = summary.transactions, "warehouse ledger purged");
        Ok(summary)
    }

    // ---- queries -----------------------------------------------------------

    /// Every batch record of a warehouse, zero-quantity ones included.
    pub fn batches(&self, warehouse_id: &WarehouseId) -> LedgerResult<Vec<Batch>> {
        self.warehouses.require(warehouse_id)?;
        Ok(self.store.batches(warehouse_id)?)
    }

    /// Batches currently holding stock.
    pub fn held_batches(&self, warehouse_id: &WarehouseId) -> LedgerResult<Vec<Batch>> {
        let mut batches = self.batches(warehouse_id)?;
        batches.retain(Batch::is_held);
        Ok(batches)
    }

    pub fn batch(&self, warehouse_id: &WarehouseId, code: &BatchCode) -> LedgerResult<Batch> {
        let key = BatchKey::new(warehouse_id.clone(), code.clone());
        self.store
            .batch(&key)?
            .ok_or_else(|| LedgerError::NotFound(format!("batch '{key}'")))
    }

    pub fn total_items(&self, warehouse_id: &WarehouseId) -> LedgerResult<i64> {
        Ok(self.store.total_items(warehouse_id)?)
    }

    /// One warehouse's records, newest first.
    pub fn transactions(&self, warehouse_id: &WarehouseId) -> LedgerResult<Vec<Transaction>> {
        self.warehouses.require(warehouse_id)?;
        let mut records = self.store.transactions(warehouse_id)?;
        records.reverse();
        Ok(records)
    }

    /// Records of every warehouse, newest first, optionally narrowed to a
    /// calendar year and/or month.
    pub fn history(&self, filter: HistoryFilter) -> LedgerResult<Vec<Transaction>> {
        filter.validate()?;
        let mut records = self.store.all_transactions()?;
        records.retain(|tx| filter.matches(tx));
        Ok(records)
    }

    pub fn low_stock(&self) -> LowStockEvaluator<'_, S> {
        LowStockEvaluator::new(
            &self.store,
            self.warehouses.as_ref(),
            self.products.as_ref(),
            self.config.default_low_stock_threshold,
        )
    }

    // ---- transfer reconciliation ------------------------------------------

    /// Transfers still `Pending` or `Debited`.
    pub fn pending_transfers(&self) -> LedgerResult<Vec<TransferIntent>> {
        Ok(self.store.open_intents()?)
    }

    pub fn transfer_intent(&self, id: &TransactionId) -> LedgerResult<TransferIntent> {
        self.store
            .load_intent(id)?
            .ok_or_else(|| LedgerError::NotFound(format!("transfer '{id}'")))
    }

    /// Forward recovery: credit the destination of a debited transfer.
    ///
    /// A `Pending` intent whose debit never reached the log is cancelled.
    #[instrument(skip(self))]
    pub fn resume_transfer(&self, id: &TransactionId) -> LedgerResult<TransferIntent> {
        observe("resume_transfer", self.try_resume_transfer(id))
    }

    fn try_resume_transfer(&self, id: &TransactionId) -> LedgerResult<TransferIntent> {
        let mut intent = self.reconcilable(id)?;
        if intent.status != TransferStatus::Debited {
            return Ok(intent);
        }
        self.credit(&mut intent)?;
        info!("stalled transfer resumed");
        Ok(intent)
    }

    /// Backward recovery: put the debited quantity back at the source.
    #[instrument(skip(self))]
    pub fn compensate_transfer(&self, id: &TransactionId) -> LedgerResult<TransferIntent> {
        observe("compensate_transfer", self.try_compensate_transfer(id))
    }

    fn try_compensate_transfer(&self, id: &TransactionId) -> LedgerResult<TransferIntent> {
        let mut intent = self.reconcilable(id)?;
        if intent.status != TransferStatus::Debited {
            return Ok(intent);
        }

        let at = Utc::now();
        let records = self.with_retries("compensate_transfer", || {
            let source = self.store.batch(&intent.source_key())?;
            let changeset = rules::compensate(&intent, source.as_ref(), at)?;
            Ok(self.store.commit(changeset)?)
        })?;
        self.publish_recorded(&records);

        intent.advance(TransferStatus::Compensated, None, at)?;
        self.store.save_intent(&intent)?;
        info!("stalled transfer compensated");
        Ok(intent)
    }

    /// Load an open intent and settle what the logs already prove.
    ///
    /// Returns the intent as `Debited` when an operator decision is still
    /// needed, or in its terminal state otherwise.
    fn reconcilable(&self, id: &TransactionId) -> LedgerResult<TransferIntent> {
        let mut intent = self.transfer_intent(id)?;
        if !intent.status.is_open() {
            return Err(LedgerError::Invariant(format!(
                "transfer '{id}' is already {}",
                intent.status.as_str()
            )));
        }

        let now = Utc::now();
        if intent.status == TransferStatus::Pending {
            if self.store.contains_transaction(&intent.from, &intent.id)? {
                intent.advance(TransferStatus::Debited, None, now)?;
            } else {
                intent.advance(
                    TransferStatus::Cancelled,
                    Some("source was never debited".to_string()),
                    now,
                )?;
            }
            self.store.save_intent(&intent)?;
        }

        if intent.status == TransferStatus::Debited
            && self.store.contains_transaction(&intent.to, &intent.transfer_in_id())?
        {
            intent.advance(TransferStatus::Completed, None, now)?;
            self.store.save_intent(&intent)?;
        }
        Ok(intent)
    }

    // ---- internals ---------------------------------------------------------

    fn transfer_atomic(&self, cmd: &Transfer) -> LedgerResult<TransferReceipt> {
        let (intent, records) = self.with_retries("transfer", || {
            let plan = self.plan_transfer(cmd)?;
            let records = self.commit_checked(plan.combined())?;
            Ok((plan.intent, records))
        })?;
        self.publish_recorded(&records);
        Ok(TransferReceipt {
            intent_id: intent.id,
            transfer_out: record_of(&records, TransactionType::TransferOut)?,
            transfer_in: record_of(&records, TransactionType::TransferIn)?,
        })
    }

    fn transfer_saga(&self, cmd: &Transfer) -> LedgerResult<TransferReceipt> {
        let mut recorded: Option<TransferIntent> = None;
        let debit = self.with_retries("transfer_debit", || {
            let plan = self.plan_transfer(cmd)?;
            if recorded.is_none() {
                self.store.record_intent(&plan.intent).map_err(|e| match e {
                    StoreError::AlreadyExists(_) => LedgerError::DuplicateSubmission {
                        id: plan.intent.id.clone(),
                    },
                    other => other.into(),
                })?;
                recorded = Some(plan.intent.clone());
            }
            self.commit_checked(plan.debit)
        });

        let records = match debit {
            Ok(records) => records,
            Err(err) => {
                if let Some(mut intent) = recorded {
                    match intent.advance(TransferStatus::Cancelled, Some(err.to_string()), Utc::now()) {
                        Ok(()) => {
                            if let Err(save_err) = self.store.save_intent(&intent) {
                                warn!(intent_id = %intent.id, error = %save_err, "failed to cancel transfer intent");
                            }
                        }
                        Err(advance_err) => {
                            warn!(intent_id = %intent.id, error = %advance_err, "transfer intent cannot be cancelled");
                        }
                    }
                }
                return Err(err);
            }
        };
        self.publish_recorded(&records);
        let transfer_out = record_of(&records, TransactionType::TransferOut)?;

        let Some(mut intent) = recorded else {
            return Err(LedgerError::Invariant("transfer intent was not recorded".to_string()));
        };
        intent.advance(TransferStatus::Debited, None, Utc::now())?;
        if let Err(err) = self.store.save_intent(&intent) {
            // The intent stays Pending; reconciliation finds the debit in the log.
            warn!(intent_id = %intent.id, error = %err, "failed to mark transfer intent debited");
        }

        let transfer_in = self.credit(&mut intent)?;
        Ok(TransferReceipt {
            intent_id: intent.id,
            transfer_out,
            transfer_in,
        })
    }

    /// Credit the destination of a debited intent and mark it completed.
    fn credit(&self, intent: &mut TransferIntent) -> LedgerResult<Transaction> {
        let credited = self.with_retries("transfer_credit", || {
            let destination = self.store.batch(&intent.destination_key())?;
            let changeset = rules::credit_destination(intent, destination.as_ref())?;
            Ok(self.store.commit(changeset)?)
        });

        match credited {
            Ok(records) => {
                self.publish_recorded(&records);
                intent.advance(TransferStatus::Completed, None, Utc::now())?;
                if let Err(err) = self.store.save_intent(intent) {
                    warn!(intent_id = %intent.id, error = %err, "failed to mark transfer intent completed");
                }
                record_of(&records, TransactionType::TransferIn)
            }
            Err(err) => {
                let reason = err.to_string();
                intent.error = Some(reason.clone());
                intent.updated_at = Utc::now();
                if let Err(save_err) = self.store.save_intent(intent) {
                    warn!(intent_id = %intent.id, error = %save_err, "failed to record transfer failure");
                }
                self.publish(
                    LedgerEvent::TransferStalled {
                        intent: intent.clone(),
                    },
                    self.log_sequence(&intent.from),
                );
                error!(
                    intent_id = %intent.id,
                    from = %intent.from,
                    to = %intent.to,
                    code = %intent.code,
                    quantity = intent.quantity,
                    error = %reason,
                    "transfer debited source but failed to credit destination"
                );
                Err(LedgerError::PartialTransfer {
                    from: intent.from.clone(),
                    to: intent.to.clone(),
                    code: intent.code.clone(),
                    quantity: intent.quantity,
                    intent_id: intent.id.clone(),
                    reason,
                })
            }
        }
    }

    /// Log length used as the notification sequence; a failed read is
    /// logged and reported as 0.
    fn log_sequence(&self, warehouse_id: &WarehouseId) -> u64 {
        match self.store.transaction_count(warehouse_id) {
            Ok(count) => count,
            Err(err) => {
                warn!(warehouse_id = %warehouse_id, error = %err, "failed to read transaction log length");
                0
            }
        }
    }

    fn plan_transfer(&self, cmd: &Transfer) -> LedgerResult<TransferPlan> {
        let source = self.store.batch(&BatchKey::new(cmd.from.clone(), cmd.code.clone()))?;
        let destination = self.store.batch(&BatchKey::new(cmd.to.clone(), cmd.code.clone()))?;
        let snapshot = self.snapshot_for(&cmd.product, source.as_ref());
        Ok(rules::plan_transfer(cmd, source.as_ref(), destination.as_ref(), &snapshot)?)
    }

    /// Unit/category for a new record: the catalog's current values when the
    /// product is still listed, else whatever the batch carried.
    fn snapshot_for(&self, product: &ProductName, batch: Option<&Batch>) -> ProductSnapshot {
        let product_ref = batch.map_or_else(|| product.to_string(), |b| b.product_ref.clone());
        match (self.products.get(product), batch) {
            (Some(p), _) => ProductSnapshot {
                product_ref,
                unit: p.unit,
                category: p.category,
            },
            (None, Some(b)) => ProductSnapshot::of_batch(b),
            (None, None) => ProductSnapshot {
                product_ref,
                unit: String::new(),
                category: String::new(),
            },
        }
    }

    fn commit_checked(&self, changeset: Changeset) -> LedgerResult<Vec<Transaction>> {
        if self.config.duplicate_submissions == DuplicateSubmissionPolicy::Reject {
            for tx in &changeset.transactions {
                if self.store.contains_transaction(&tx.warehouse_id, &tx.id)? {
                    return Err(LedgerError::DuplicateSubmission { id: tx.id.clone() });
                }
            }
        }
        Ok(self.store.commit(changeset)?)
    }

    fn with_retries<T>(&self, operation: &'static str, mut attempt: impl FnMut() -> LedgerResult<T>) -> LedgerResult<T> {
        let mut retries = 0;
        loop {
            match attempt() {
                Err(LedgerError::Conflict(reason)) if retries < self.config.max_conflict_retries => {
                    retries += 1;
                    debug!(operation, retries, %reason, "conditional write lost a race; re-reading");
                }
                other => return other,
            }
        }
    }

    fn publish(&self, event: LedgerEvent, sequence: u64) {
        let envelope = EventEnvelope::wrap(event.warehouse_id().clone(), sequence, event);
        if let Err(err) = self.bus.publish(envelope) {
            warn!(error = ?err, "failed to publish ledger notification");
        }
    }

    fn publish_recorded(&self, records: &[Transaction]) {
        for tx in records {
            self.publish(
                LedgerEvent::TransactionRecorded {
                    transaction: tx.clone(),
                },
                tx.sequence,
            );
        }
    }
}
