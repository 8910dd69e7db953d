use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{ActorName, BatchCode, DomainError, DomainResult, ProductName, WarehouseId};

pub const DEFAULT_TRANSFER_REASON: &str = "Transfer";
pub const DEFAULT_EDIT_REASON: &str = "Edit";

fn default_transfer_reason() -> String {
    DEFAULT_TRANSFER_REASON.to_string()
}

fn default_edit_reason() -> String {
    DEFAULT_EDIT_REASON.to_string()
}

fn ensure_positive(quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be greater than zero"));
    }
    Ok(())
}

fn ensure_reason(reason: &str) -> DomainResult<()> {
    if reason.trim().is_empty() {
        return Err(DomainError::validation("reason cannot be empty"));
    }
    Ok(())
}

/// Command: receive a new batch into a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockIn {
    pub warehouse_id: WarehouseId,
    pub product: ProductName,
    pub code: BatchCode,
    pub quantity: i64,
    pub expiry_date: Option<NaiveDate>,
    pub reason: String,
    pub actor: ActorName,
    pub occurred_at: DateTime<Utc>,
}

impl StockIn {
    pub fn validate(&self) -> DomainResult<()> {
        ensure_positive(self.quantity)?;
        ensure_reason(&self.reason)
    }
}

/// Command: issue quantity out of an existing batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockOut {
    pub warehouse_id: WarehouseId,
    pub product: ProductName,
    pub code: BatchCode,
    pub quantity: i64,
    pub reason: String,
    pub actor: ActorName,
    pub occurred_at: DateTime<Utc>,
}

impl StockOut {
    pub fn validate(&self) -> DomainResult<()> {
        ensure_positive(self.quantity)?;
        ensure_reason(&self.reason)
    }
}

/// Command: move quantity of a batch between two warehouses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: WarehouseId,
    pub to: WarehouseId,
    pub product: ProductName,
    pub code: BatchCode,
    pub quantity: i64,
    #[serde(default = "default_transfer_reason")]
    pub reason: String,
    pub actor: ActorName,
    pub occurred_at: DateTime<Utc>,
}

impl Transfer {
    pub fn validate(&self) -> DomainResult<()> {
        if self.from == self.to {
            return Err(DomainError::validation(
                "destination warehouse must differ from source",
            ));
        }
        ensure_positive(self.quantity)?;
        ensure_reason(&self.reason)
    }
}

/// Command: correct a batch's quantity and expiry in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditBatch {
    pub warehouse_id: WarehouseId,
    pub code: BatchCode,
    pub quantity: i64,
    pub expiry_date: Option<NaiveDate>,
    #[serde(default = "default_edit_reason")]
    pub reason: String,
    pub actor: ActorName,
    pub occurred_at: DateTime<Utc>,
}

impl EditBatch {
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity < 0 {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        ensure_reason(&self.reason)
    }
}
