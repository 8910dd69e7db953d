//! Infrastructure layer: ledger storage, the operation engine and config.

pub mod config;
pub mod engine;
pub mod error;
pub mod low_stock;
pub mod maintenance;
pub mod store;

pub use config::{DuplicateSubmissionPolicy, LedgerConfig};
pub use engine::{HistoryFilter, LedgerEngine, LedgerResult, TransferReceipt};
pub use error::LedgerError;
pub use low_stock::LowStockEvaluator;
pub use store::{Atomicity, InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, PurgeSummary, StoreError};

#[cfg(test)]
mod integration_tests;
