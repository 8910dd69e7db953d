use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{BatchCode, WarehouseId};
use stockledger_events::Event;

use crate::transaction::Transaction;
use crate::transfer::TransferIntent;

/// Change notifications published after a commit.
///
/// Subscribers use them as a cue to re-query; they are not a replication feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEvent {
    TransactionRecorded {
        transaction: Transaction,
    },
    BatchPurged {
        warehouse_id: WarehouseId,
        code: BatchCode,
        occurred_at: DateTime<Utc>,
    },
    TransferStalled {
        intent: TransferIntent,
    },
    WarehouseDeleted {
        warehouse_id: WarehouseId,
        occurred_at: DateTime<Utc>,
    },
}

impl LedgerEvent {
    /// Warehouse whose state changed.
    pub fn warehouse_id(&self) -> &WarehouseId {
        match self {
            LedgerEvent::TransactionRecorded { transaction } => &transaction.warehouse_id,
            LedgerEvent::BatchPurged { warehouse_id, .. } => warehouse_id,
            LedgerEvent::TransferStalled { intent } => &intent.from,
            LedgerEvent::WarehouseDeleted { warehouse_id, .. } => warehouse_id,
        }
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::TransactionRecorded { .. } => "ledger.transaction.recorded",
            LedgerEvent::BatchPurged { .. } => "ledger.batch.purged",
            LedgerEvent::TransferStalled { .. } => "ledger.transfer.stalled",
            LedgerEvent::WarehouseDeleted { .. } => "ledger.warehouse.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::TransactionRecorded { transaction } => transaction.timestamp,
            LedgerEvent::BatchPurged { occurred_at, .. } => *occurred_at,
            LedgerEvent::TransferStalled { intent } => intent.updated_at,
            LedgerEvent::WarehouseDeleted { occurred_at, .. } => *occurred_at,
        }
    }
}
