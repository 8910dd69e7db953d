//! Batch ledger domain module.
//!
//! Business rules for batches, the transaction log records describing every
//! quantity change, the transaction identifier scheme and low-stock
//! evaluation, implemented purely as deterministic domain logic (no IO, no
//! storage). Decisions are expressed as [`Changeset`]s that a store commits.

pub mod batch;
pub mod changeset;
pub mod command;
pub mod event;
pub mod low_stock;
pub mod rules;
pub mod transaction;
pub mod transfer;
pub mod txid;

pub use batch::{Batch, BatchKey};
pub use changeset::{BatchWrite, Changeset};
pub use command::{EditBatch, StockIn, StockOut, Transfer};
pub use event::LedgerEvent;
pub use low_stock::{LowStockAlert, ProductShortage, alerts_by_product, evaluate_warehouse};
pub use rules::{ProductSnapshot, TransferPlan};
pub use transaction::{Transaction, TransactionType};
pub use transfer::{TransferIntent, TransferStatus};
pub use txid::TransactionId;
