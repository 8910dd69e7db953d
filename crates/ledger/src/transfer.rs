//! Persisted intent for transfers executed as two separate commits.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{ActorName, BatchCode, DomainError, DomainResult, ProductName, WarehouseId};

use crate::batch::{Batch, BatchKey};
use crate::command::{DEFAULT_TRANSFER_REASON, Transfer};
use crate::txid::TransactionId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// Recorded; the source debit may or may not have been committed.
    Pending,
    /// Source debited, destination not yet credited.
    Debited,
    /// Both sides committed.
    Completed,
    /// Source re-credited after a failed credit.
    Compensated,
    /// The debit was never committed.
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Debited => "debited",
            TransferStatus::Completed => "completed",
            TransferStatus::Compensated => "compensated",
            TransferStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "pending" => Ok(TransferStatus::Pending),
            "debited" => Ok(TransferStatus::Debited),
            "completed" => Ok(TransferStatus::Completed),
            "compensated" => Ok(TransferStatus::Compensated),
            "cancelled" => Ok(TransferStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown transfer status '{other}'"))),
        }
    }

    /// Open intents still need an operator decision or a resume.
    pub fn is_open(&self) -> bool {
        matches!(self, TransferStatus::Pending | TransferStatus::Debited)
    }

    fn can_become(&self, next: TransferStatus) -> bool {
        matches!(
            (self, next),
            (TransferStatus::Pending, TransferStatus::Debited)
                | (TransferStatus::Pending, TransferStatus::Cancelled)
                | (TransferStatus::Debited, TransferStatus::Completed)
                | (TransferStatus::Debited, TransferStatus::Compensated)
        )
    }
}

/// A transfer in flight, with everything needed to finish or undo it.
///
/// The id is the `transferOut` transaction id, so the intent can be matched
/// against the source log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferIntent {
    pub id: TransactionId,
    pub from: WarehouseId,
    pub to: WarehouseId,
    pub code: BatchCode,
    pub product: ProductName,
    pub product_ref: String,
    pub quantity: i64,
    pub unit: String,
    pub category: String,
    pub expiry_date: Option<NaiveDate>,
    pub reason: String,
    pub actor: ActorName,
    /// Business time of the transfer; both transaction ids derive from it.
    pub occurred_at: DateTime<Utc>,
    pub status: TransferStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransferIntent {
    pub fn new(cmd: &Transfer, source: &Batch, unit: &str, category: &str) -> Self {
        Self {
            id: TransactionId::transfer_out(&cmd.from, &cmd.code, &cmd.to, cmd.occurred_at),
            from: cmd.from.clone(),
            to: cmd.to.clone(),
            code: cmd.code.clone(),
            product: source.product.clone(),
            product_ref: source.product_ref.clone(),
            quantity: cmd.quantity,
            unit: unit.to_string(),
            category: category.to_string(),
            expiry_date: source.expiry_date,
            reason: cmd.reason.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
            status: TransferStatus::Pending,
            error: None,
            created_at: cmd.occurred_at,
            updated_at: cmd.occurred_at,
        }
    }

    pub fn source_key(&self) -> BatchKey {
        BatchKey::new(self.from.clone(), self.code.clone())
    }

    pub fn destination_key(&self) -> BatchKey {
        BatchKey::new(self.to.clone(), self.code.clone())
    }

    pub fn transfer_in_id(&self) -> TransactionId {
        TransactionId::transfer_in(&self.to, &self.code, &self.from, self.occurred_at)
    }

    /// Move to `next`, rejecting transitions out of a terminal state.
    pub fn advance(
        &mut self,
        next: TransferStatus,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !self.status.can_become(next) {
            return Err(DomainError::invariant(format!(
                "transfer '{}' cannot move from {} to {}",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        if error.is_some() {
            self.error = error;
        }
        self.updated_at = at;
        Ok(())
    }

    /// Batch to create at `warehouse_id` when no batch with this code exists there.
    ///
    /// Its reason is always the default transfer reason; the caller's reason
    /// only goes on the transaction records.
    pub fn seed_batch(&self, warehouse_id: &WarehouseId) -> Batch {
        Batch {
            warehouse_id: warehouse_id.clone(),
            code: self.code.clone(),
            product: self.product.clone(),
            product_ref: self.product_ref.clone(),
            quantity: self.quantity,
            unit: self.unit.clone(),
            expiry_date: self.expiry_date,
            reason: DEFAULT_TRANSFER_REASON.to_string(),
            category: self.category.clone(),
            created_by: self.actor.clone(),
            created_at: self.occurred_at,
            version: 0,
        }
    }
}
