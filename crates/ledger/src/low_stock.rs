//! Low-stock evaluation over one warehouse's batches.
//!
//! Held batches (quantity > 0) are grouped by product and summed. When the
//! product total is at or below its threshold, one alert is emitted for
//! *each* contributing batch so the physical lots behind a shortage stay
//! visible. [`alerts_by_product`] collapses them for product-level views.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockledger_core::{BatchCode, ProductName, WarehouseId};

use crate::batch::Batch;

/// Derived signal for one batch of a product running low in a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStockAlert {
    pub warehouse_id: WarehouseId,
    pub warehouse_name: String,
    pub product: ProductName,
    pub code: BatchCode,
    pub batch_quantity: i64,
    /// Sum over every held batch of the product in the warehouse.
    pub total_quantity: i64,
    pub threshold: i64,
    pub unit: String,
}

/// One row per (warehouse, product) after de-duplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductShortage {
    pub warehouse_id: WarehouseId,
    pub warehouse_name: String,
    pub product: ProductName,
    pub total_quantity: i64,
    pub threshold: i64,
    pub codes: Vec<BatchCode>,
}

/// Evaluate a single warehouse.
///
/// `threshold_for` resolves a product's effective threshold (catalog value or
/// the configured default).
pub fn evaluate_warehouse<F>(
    warehouse_id: &WarehouseId,
    warehouse_name: &str,
    batches: &[Batch],
    threshold_for: F,
) -> Vec<LowStockAlert>
where
    F: Fn(&ProductName) -> i64,
{
    let mut by_product: BTreeMap<&ProductName, Vec<&Batch>> = BTreeMap::new();
    for batch in batches.iter().filter(|b| b.is_held()) {
        by_product.entry(&batch.product).or_default().push(batch);
    }

    let mut alerts = Vec::new();
    for (product, lots) in by_product {
        let total = lots.iter().fold(0i64, |acc, b| acc.saturating_add(b.quantity));
        let threshold = threshold_for(product);
        if total > threshold {
            continue;
        }
        for batch in lots {
            alerts.push(LowStockAlert {
                warehouse_id: warehouse_id.clone(),
                warehouse_name: warehouse_name.to_string(),
                product: product.clone(),
                code: batch.code.clone(),
                batch_quantity: batch.quantity,
                total_quantity: total,
                threshold,
                unit: batch.unit.clone(),
            });
        }
    }
    alerts
}

/// Collapse per-batch alerts to one entry per (warehouse, product).
pub fn alerts_by_product(alerts: &[LowStockAlert]) -> Vec<ProductShortage> {
    let mut grouped: BTreeMap<(WarehouseId, ProductName), ProductShortage> = BTreeMap::new();
    for alert in alerts {
        grouped
            .entry((alert.warehouse_id.clone(), alert.product.clone()))
            .or_insert_with(|| ProductShortage {
                warehouse_id: alert.warehouse_id.clone(),
                warehouse_name: alert.warehouse_name.clone(),
                product: alert.product.clone(),
                total_quantity: alert.total_quantity,
                threshold: alert.threshold,
                codes: Vec::new(),
            })
            .codes
            .push(alert.code.clone());
    }
    grouped.into_values().collect()
}
