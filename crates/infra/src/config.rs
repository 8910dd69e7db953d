//! Ledger behaviour settings.

use serde::Deserialize;

/// Threshold applied to products with no usable low-stock threshold.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

/// What to do when a command's deterministic transaction id is already in
/// the warehouse log.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateSubmissionPolicy {
    /// Record it anyway; ids are not unique keys.
    #[default]
    Allow,
    /// Reject with `LedgerError::DuplicateSubmission`.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub default_low_stock_threshold: i64,
    /// Re-read/re-decide attempts after a conditional write loses a race.
    pub max_conflict_retries: u32,
    pub duplicate_submissions: DuplicateSubmissionPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            max_conflict_retries: 3,
            duplicate_submissions: DuplicateSubmissionPolicy::Allow,
        }
    }
}
