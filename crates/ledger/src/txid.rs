//! Deterministic transaction identifiers.
//!
//! `{warehouse}-{code}-{type}-{reason or counterpart}-{YYYYMMDD}[-{HHMMSS}]`
//!
//! Stock-in, stock-out and edit ids carry the reason and a date stamp only.
//! Transfer ids carry the counterpart warehouse and a time-of-day stamp, since
//! the same batch can move several times a day. Stamps are taken in UTC.
//!
//! The same inputs always yield byte-identical ids, which lets reconciliation
//! tooling rebuild an id from its components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{BatchCode, WarehouseId};

use crate::transaction::TransactionType;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Build an id from its components.
    ///
    /// `qualifier` is the reason for stock-in/out/edit and the counterpart
    /// warehouse for transfers.
    pub fn compose(
        warehouse_id: &WarehouseId,
        code: &BatchCode,
        kind: TransactionType,
        qualifier: &str,
        at: DateTime<Utc>,
    ) -> Self {
        let date = at.format("%Y%m%d");
        let id = if kind.is_transfer() {
            format!(
                "{warehouse_id}-{code}-{}-{qualifier}-{date}-{}",
                kind.as_str(),
                at.format("%H%M%S")
            )
        } else {
            format!("{warehouse_id}-{code}-{}-{qualifier}-{date}", kind.as_str())
        };
        Self(id)
    }

    pub fn stock_in(warehouse_id: &WarehouseId, code: &BatchCode, reason: &str, at: DateTime<Utc>) -> Self {
        Self::compose(warehouse_id, code, TransactionType::StockIn, reason, at)
    }

    pub fn stock_out(warehouse_id: &WarehouseId, code: &BatchCode, reason: &str, at: DateTime<Utc>) -> Self {
        Self::compose(warehouse_id, code, TransactionType::StockOut, reason, at)
    }

    pub fn edit(warehouse_id: &WarehouseId, code: &BatchCode, reason: &str, at: DateTime<Utc>) -> Self {
        Self::compose(warehouse_id, code, TransactionType::Edit, reason, at)
    }

    pub fn transfer_out(from: &WarehouseId, code: &BatchCode, to: &WarehouseId, at: DateTime<Utc>) -> Self {
        Self::compose(from, code, TransactionType::TransferOut, to.as_str(), at)
    }

    pub fn transfer_in(to: &WarehouseId, code: &BatchCode, from: &WarehouseId, at: DateTime<Utc>) -> Self {
        Self::compose(to, code, TransactionType::TransferIn, from.as_str(), at)
    }

    /// Wrap an id read back from storage.
    pub fn from_stored(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
