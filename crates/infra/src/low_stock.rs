//! Low-stock evaluation over live store contents.

use tracing::debug;

use stockledger_catalog::{ProductCatalog, Warehouse, WarehouseRegistry};
use stockledger_core::{ProductName, WarehouseId};
use stockledger_ledger::{LowStockAlert, ProductShortage, alerts_by_product, evaluate_warehouse};

use crate::error::LedgerError;
use crate::store::BatchStore;

/// Borrowed view that evaluates thresholds against the current batches.
pub struct LowStockEvaluator<'a, S: ?Sized> {
    store: &'a S,
    warehouses: &'a dyn WarehouseRegistry,
    products: &'a dyn ProductCatalog,
    default_threshold: i64,
}

impl<'a, S> LowStockEvaluator<'a, S>
where
    S: BatchStore + ?Sized,
{
    pub fn new(
        store: &'a S,
        warehouses: &'a dyn WarehouseRegistry,
        products: &'a dyn ProductCatalog,
        default_threshold: i64,
    ) -> Self {
        Self {
            store,
            warehouses,
            products,
            default_threshold,
        }
    }

    /// Effective threshold: catalog value when set and numeric, else the default.
    pub fn threshold_for(&self, product: &ProductName) -> i64 {
        self.products
            .get(product)
            .map_or(self.default_threshold, |p| p.threshold_or(self.default_threshold))
    }

    /// One alert per held batch whose product total is at or below threshold.
    ///
    /// `scope` narrows evaluation to one warehouse; `None` covers every
    /// registered warehouse.
    pub fn evaluate(&self, scope: Option<&WarehouseId>) -> Result<Vec<LowStockAlert>, LedgerError> {
        let warehouses: Vec<Warehouse> = match scope {
            Some(id) => vec![self.warehouses.require(id)?],
            None => self.warehouses.list(),
        };

        let mut alerts = Vec::new();
        for warehouse in &warehouses {
            let batches = self.store.batches(&warehouse.id)?;
            let found = evaluate_warehouse(&warehouse.id, &warehouse.name, &batches, |p| self.threshold_for(p));
            debug!(warehouse_id = %warehouse.id, alerts = found.len(), "low-stock evaluated");
            alerts.extend(found);
        }
        Ok(alerts)
    }

    /// Alerts collapsed to one row per (warehouse, product).
    pub fn shortages(&self, scope: Option<&WarehouseId>) -> Result<Vec<ProductShortage>, LedgerError> {
        Ok(alerts_by_product(&self.evaluate(scope)?))
    }
}
