//! Master data the ledger reads: warehouses and products.
//!
//! The ledger only ever *reads* through [`WarehouseRegistry`] and
//! [`ProductCatalog`]; the mutating methods on the in-memory implementations
//! serve the master-data screens and seeding.

pub mod memory;
pub mod product;
pub mod registry;
pub mod warehouse;

pub use memory::InMemoryEntityStore;
pub use product::{NewProduct, Product};
pub use registry::{InMemoryProductCatalog, InMemoryWarehouseRegistry, ProductCatalog, WarehouseRegistry};
pub use warehouse::{NewWarehouse, Warehouse, WarehouseCategory, WarehouseStatus, WarehouseUpdate};
