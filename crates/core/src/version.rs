//! Record versions and optimistic concurrency expectations.

use crate::error::{DomainError, DomainResult};

/// A record that tracks how many times it has been written.
///
/// Stores bump the version on every successful write; a conditional write
/// carries the version it was decided against (see [`ExpectedVersion`]).
pub trait Versioned {
    /// Monotonically increasing write counter. `0` means "never written".
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for a conditional write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (blind maintenance writes).
    Any,
    /// The record must not exist yet.
    Absent,
    /// Require the record to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    /// Expectation matching the current state of an optional record.
    pub fn of<T: Versioned>(current: Option<&T>) -> Self {
        match current {
            Some(record) => ExpectedVersion::Exact(record.version()),
            None => ExpectedVersion::Absent,
        }
    }

    /// `actual` is `None` when the record does not exist.
    pub fn matches(self, actual: Option<u64>) -> bool {
        match (self, actual) {
            (ExpectedVersion::Any, _) => true,
            (ExpectedVersion::Absent, None) => true,
            (ExpectedVersion::Exact(v), Some(a)) => v == a,
            _ => false,
        }
    }

    pub fn check(self, actual: Option<u64>) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual:?})"
            )))
        }
    }
}
