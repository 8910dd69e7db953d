use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{ActorName, BatchCode, ProductName, WarehouseId};

use crate::txid::TransactionId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionType {
    StockIn,
    StockOut,
    TransferOut,
    TransferIn,
    Edit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::StockIn => "stockIn",
            TransactionType::StockOut => "stockOut",
            TransactionType::TransferOut => "transferOut",
            TransactionType::TransferIn => "transferIn",
            TransactionType::Edit => "edit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stockIn" => Some(TransactionType::StockIn),
            "stockOut" => Some(TransactionType::StockOut),
            "transferOut" => Some(TransactionType::TransferOut),
            "transferIn" => Some(TransactionType::TransferIn),
            "edit" => Some(TransactionType::Edit),
            _ => None,
        }
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self, TransactionType::TransferOut | TransactionType::TransferIn)
    }

    /// Signed effect of a record of this type on the batch quantity.
    ///
    /// Edits have no direction; they are corrections to an absolute value.
    pub fn direction(&self) -> i64 {
        match self {
            TransactionType::StockIn | TransactionType::TransferIn => 1,
            TransactionType::StockOut | TransactionType::TransferOut => -1,
            TransactionType::Edit => 0,
        }
    }
}

/// Immutable record of one ledger mutation.
///
/// `quantity` is always a magnitude: positive for stock-in/out and transfers,
/// with direction carried by `kind`. For an edit it is the corrected quantity
/// (which may be zero) and `previous_quantity` holds the value it replaced.
///
/// `unit` and `category` are snapshots taken when the record was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub warehouse_id: WarehouseId,
    pub product: ProductName,
    pub code: BatchCode,
    pub quantity: i64,
    pub unit: String,
    pub expiry_date: Option<NaiveDate>,
    pub reason: String,
    pub category: String,
    pub by: ActorName,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterpart_warehouse: Option<WarehouseId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_quantity: Option<i64>,
    /// Position in the warehouse log, assigned on append (1-based).
    #[serde(default)]
    pub sequence: u64,
}

impl Transaction {
    /// Reason shown in history views; transfers name their counterpart.
    pub fn display_reason(&self) -> String {
        match (&self.kind, &self.counterpart_warehouse) {
            (TransactionType::TransferOut, Some(to)) => format!("Transfer OUT → {to}"),
            (TransactionType::TransferIn, Some(from)) => format!("Transfer IN ← {from}"),
            _ => self.reason.clone(),
        }
    }

    /// Whether the record falls in the given calendar month (UTC, month 1–12).
    pub fn in_month(&self, year: i32, month: u32) -> bool {
        self.timestamp.year() == year && self.timestamp.month() == month
    }

    /// Signed quantity effect of this record, `None` for edits.
    pub fn signed_quantity(&self) -> Option<i64> {
        match self.kind {
            TransactionType::Edit => None,
            kind => Some(kind.direction() * self.quantity),
        }
    }
}

/// Sort newest first; ties keep log order (higher sequence first).
pub fn newest_first(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.sequence.cmp(&a.sequence))
            .then_with(|| a.warehouse_id.cmp(&b.warehouse_id))
    });
}
