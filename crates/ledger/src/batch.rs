use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{ActorName, BatchCode, Entity, ProductName, Versioned, WarehouseId};

/// Address of a batch: a code is unique within one warehouse only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchKey {
    pub warehouse_id: WarehouseId,
    pub code: BatchCode,
}

impl BatchKey {
    pub fn new(warehouse_id: WarehouseId, code: BatchCode) -> Self {
        Self { warehouse_id, code }
    }
}

impl core::fmt::Display for BatchKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.warehouse_id, self.code)
    }
}

/// A quantity of one product held in one warehouse under an operator-chosen code.
///
/// Invariant: `quantity >= 0`. A batch that reaches zero is kept as a
/// zero-quantity record until it is explicitly purged, so "currently held"
/// views filter on [`Batch::is_held`] rather than on absence.
///
/// `unit` and `category` are copied from the catalog when the batch is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub warehouse_id: WarehouseId,
    pub code: BatchCode,
    pub product: ProductName,
    /// Catalog key the batch was received against.
    pub product_ref: String,
    pub quantity: i64,
    pub unit: String,
    pub expiry_date: Option<NaiveDate>,
    /// Free-text reason of the originating event.
    pub reason: String,
    pub category: String,
    pub created_by: ActorName,
    pub created_at: DateTime<Utc>,
    /// Write counter maintained by the store (`0` until first stored).
    #[serde(default)]
    pub version: u64,
}

impl Batch {
    pub fn key(&self) -> BatchKey {
        BatchKey::new(self.warehouse_id.clone(), self.code.clone())
    }

    pub fn is_held(&self) -> bool {
        self.quantity > 0
    }
}

impl Entity for Batch {
    type Id = BatchCode;

    fn id(&self) -> &Self::Id {
        &self.code
    }
}

impl Versioned for Batch {
    fn version(&self) -> u64 {
        self.version
    }
}
