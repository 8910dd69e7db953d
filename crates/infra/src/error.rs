use thiserror::Error;

use stockledger_core::{BatchCode, DomainError, WarehouseId};
use stockledger_ledger::TransactionId;

use crate::store::StoreError;

/// Errors surfaced by [`crate::engine::LedgerEngine`].
///
/// Every variant except `PartialTransfer` means nothing was written.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Missing or invalid input (empty code, non-positive quantity, missing reason).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Stock-in against a code that already exists in the warehouse.
    #[error("batch '{code}' already exists in warehouse '{warehouse}'")]
    DuplicateBatch { warehouse: String, code: String },

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { available: i64, requested: i64 },

    /// Unknown warehouse, product, batch or transfer.
    #[error("not found: {0}")]
    NotFound(String),

    /// The source was debited but the destination credit failed.
    ///
    /// The intent stays `Debited` until an operator resumes or compensates it.
    #[error(
        "transfer of {quantity} x '{code}' from '{from}' to '{to}' debited the source but did not credit the destination (intent {intent_id}): {reason}"
    )]
    PartialTransfer {
        from: WarehouseId,
        to: WarehouseId,
        code: BatchCode,
        quantity: i64,
        intent_id: TransactionId,
        reason: String,
    },

    /// Conditional writes kept losing races; nothing was written.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("duplicate submission: transaction '{id}' is already recorded")]
    DuplicateSubmission { id: TransactionId },

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Store(StoreError),
}

impl LedgerError {
    /// Stable machine-readable code for API bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation_error",
            LedgerError::DuplicateBatch { .. } => "duplicate_batch",
            LedgerError::InsufficientStock { .. } => "insufficient_stock",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::PartialTransfer { .. } => "partial_transfer",
            LedgerError::Conflict(_) => "conflict",
            LedgerError::DuplicateSubmission { .. } => "duplicate_submission",
            LedgerError::Invariant(_) => "invariant_violation",
            LedgerError::Unauthorized => "unauthorized",
            LedgerError::Store(_) => "storage_error",
        }
    }

    /// Rejections are caller errors; everything else is an operational failure.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, LedgerError::PartialTransfer { .. } | LedgerError::Store(_))
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => LedgerError::Validation(msg),
            DomainError::InvalidId(msg) => LedgerError::Validation(msg),
            DomainError::InvariantViolation(msg) => LedgerError::Invariant(msg),
            DomainError::NotFound(what) => LedgerError::NotFound(what),
            DomainError::DuplicateBatch { warehouse, code } => LedgerError::DuplicateBatch { warehouse, code },
            DomainError::InsufficientStock {
                available,
                requested,
            } => LedgerError::InsufficientStock {
                available,
                requested,
            },
            DomainError::Conflict(msg) => LedgerError::Conflict(msg),
            DomainError::Unauthorized => LedgerError::Unauthorized,
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => LedgerError::Conflict(msg),
            StoreError::AlreadyExists(msg) => LedgerError::Conflict(msg),
            StoreError::NotFound(what) => LedgerError::NotFound(what),
            StoreError::Rejected(msg) => LedgerError::Validation(msg),
            StoreError::WouldGoNegative {
                available,
                requested,
                ..
            } => LedgerError::InsufficientStock {
                available,
                requested,
            },
            other => LedgerError::Store(other),
        }
    }
}
