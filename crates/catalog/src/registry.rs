//! Read boundaries used by the ledger, plus in-memory implementations.

use std::sync::Arc;

use stockledger_core::{DomainError, DomainResult, ProductName, WarehouseId};

use crate::memory::InMemoryEntityStore;
use crate::product::{NewProduct, Product, validate_threshold};
use crate::warehouse::{NewWarehouse, Warehouse, WarehouseUpdate};

/// Lookup-by-id and list-all over warehouse metadata.
pub trait WarehouseRegistry: Send + Sync {
    fn get(&self, id: &WarehouseId) -> Option<Warehouse>;
    fn list(&self) -> Vec<Warehouse>;

    fn require(&self, id: &WarehouseId) -> DomainResult<Warehouse> {
        self.get(id)
            .ok_or_else(|| DomainError::not_found(format!("warehouse '{id}'")))
    }
}

/// Lookup-by-name and list-all over the product catalog.
pub trait ProductCatalog: Send + Sync {
    fn get(&self, name: &ProductName) -> Option<Product>;
    fn list(&self) -> Vec<Product>;

    fn require(&self, name: &ProductName) -> DomainResult<Product> {
        self.get(name)
            .ok_or_else(|| DomainError::not_found(format!("product '{name}'")))
    }
}

impl<R> WarehouseRegistry for Arc<R>
where
    R: WarehouseRegistry + ?Sized,
{
    fn get(&self, id: &WarehouseId) -> Option<Warehouse> {
        (**self).get(id)
    }

    fn list(&self) -> Vec<Warehouse> {
        (**self).list()
    }
}

impl<C> ProductCatalog for Arc<C>
where
    C: ProductCatalog + ?Sized,
{
    fn get(&self, name: &ProductName) -> Option<Product> {
        (**self).get(name)
    }

    fn list(&self) -> Vec<Product> {
        (**self).list()
    }
}

/// In-memory warehouse registry.
#[derive(Debug, Default)]
pub struct InMemoryWarehouseRegistry {
    warehouses: InMemoryEntityStore<Warehouse>,
}

impl InMemoryWarehouseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a warehouse. The id is operator-chosen and must be unused.
    pub fn create(&self, input: NewWarehouse) -> DomainResult<Warehouse> {
        let warehouse = input.validate()?;
        self.warehouses.insert_new(warehouse.clone()).map_err(|_| {
            DomainError::conflict(format!("warehouse '{}' already exists", warehouse.id))
        })?;
        tracing::info!(warehouse_id = %warehouse.id, "warehouse created");
        Ok(warehouse)
    }

    pub fn update(&self, id: &WarehouseId, update: WarehouseUpdate) -> DomainResult<Warehouse> {
        self.warehouses
            .update(id, |w| update.apply_to(w))
            .map_err(|e| match e {
                DomainError::NotFound(_) => DomainError::not_found(format!("warehouse '{id}'")),
                other => other,
            })
    }

    /// Remove the metadata record only. Batches and history are purged by the
    /// cascading delete in the infra layer.
    pub fn delete(&self, id: &WarehouseId) -> DomainResult<Warehouse> {
        self.warehouses
            .remove(id)?
            .ok_or_else(|| DomainError::not_found(format!("warehouse '{id}'")))
    }
}

impl WarehouseRegistry for InMemoryWarehouseRegistry {
    fn get(&self, id: &WarehouseId) -> Option<Warehouse> {
        self.warehouses.get(id)
    }

    fn list(&self) -> Vec<Warehouse> {
        self.warehouses.list()
    }
}

/// In-memory product catalog.
#[derive(Debug, Default)]
pub struct InMemoryProductCatalog {
    products: InMemoryEntityStore<Product>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a product entry.
    pub fn upsert(&self, input: NewProduct) -> DomainResult<Product> {
        let product = input.validate()?;
        self.products.upsert(product.clone())?;
        Ok(product)
    }

    /// Set (or clear, with `None`) the low-stock threshold.
    pub fn set_threshold(&self, name: &ProductName, threshold: Option<i64>) -> DomainResult<Product> {
        if let Some(t) = threshold {
            validate_threshold(t)?;
        }
        self.products
            .update(name, |p| {
                p.low_stock_threshold = threshold;
                Ok(())
            })
            .map_err(|e| match e {
                DomainError::NotFound(_) => DomainError::not_found(format!("product '{name}'")),
                other => other,
            })
    }

    pub fn remove(&self, name: &ProductName) -> DomainResult<Product> {
        self.products
            .remove(name)?
            .ok_or_else(|| DomainError::not_found(format!("product '{name}'")))
    }
}

impl ProductCatalog for InMemoryProductCatalog {
    fn get(&self, name: &ProductName) -> Option<Product> {
        self.products.get(name)
    }

    fn list(&self) -> Vec<Product> {
        self.products.list()
    }
}
