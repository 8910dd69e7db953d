use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use stockledger_catalog::Warehouse;
use stockledger_core::{BatchCode, ProductName, WarehouseId};
use stockledger_ledger::command::{DEFAULT_EDIT_REASON, DEFAULT_TRANSFER_REASON};
use stockledger_ledger::{EditBatch, StockIn, StockOut, Transaction, Transfer};

use crate::context::PrincipalContext;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockInRequest {
    pub warehouse_id: WarehouseId,
    pub product: ProductName,
    pub code: BatchCode,
    pub quantity: i64,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    pub reason: String,
}

impl StockInRequest {
    pub fn into_command(self, principal: &PrincipalContext) -> StockIn {
        StockIn {
            warehouse_id: self.warehouse_id,
            product: self.product,
            code: self.code,
            quantity: self.quantity,
            expiry_date: self.expiry_date,
            reason: self.reason,
            actor: principal.actor().clone(),
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockOutRequest {
    pub warehouse_id: WarehouseId,
    pub product: ProductName,
    pub code: BatchCode,
    pub quantity: i64,
    pub reason: String,
}

impl StockOutRequest {
    pub fn into_command(self, principal: &PrincipalContext) -> StockOut {
        StockOut {
            warehouse_id: self.warehouse_id,
            product: self.product,
            code: self.code,
            quantity: self.quantity,
            reason: self.reason,
            actor: principal.actor().clone(),
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub from: WarehouseId,
    pub to: WarehouseId,
    pub product: ProductName,
    pub code: BatchCode,
    pub quantity: i64,
    pub reason: Option<String>,
}

impl TransferRequest {
    pub fn into_command(self, principal: &PrincipalContext) -> Transfer {
        Transfer {
            from: self.from,
            to: self.to,
            product: self.product,
            code: self.code,
            quantity: self.quantity,
            reason: self.reason.unwrap_or_else(|| DEFAULT_TRANSFER_REASON.to_string()),
            actor: principal.actor().clone(),
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditBatchRequest {
    pub warehouse_id: WarehouseId,
    pub code: BatchCode,
    pub quantity: i64,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    pub reason: Option<String>,
}

impl EditBatchRequest {
    pub fn into_command(self, principal: &PrincipalContext) -> EditBatch {
        EditBatch {
            warehouse_id: self.warehouse_id,
            code: self.code,
            quantity: self.quantity,
            expiry_date: self.expiry_date,
            reason: self.reason.unwrap_or_else(|| DEFAULT_EDIT_REASON.to_string()),
            actor: principal.actor().clone(),
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetThresholdRequest {
    pub low_stock_threshold: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchesQuery {
    pub held: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LowStockQuery {
    pub warehouse: Option<WarehouseId>,
    pub by_product: Option<bool>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn warehouse_to_json(warehouse: Warehouse, total_items: i64) -> serde_json::Value {
    let mut value = serde_json::to_value(&warehouse).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.insert("totalItems".to_string(), total_items.into());
    }
    value
}

/// Record plus the label history screens show for it.
pub fn transaction_to_json(tx: Transaction) -> serde_json::Value {
    let display_reason = tx.display_reason();
    let mut value = serde_json::to_value(&tx).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.insert("displayReason".to_string(), display_reason.into());
    }
    value
}
