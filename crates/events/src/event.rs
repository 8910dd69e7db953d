use chrono::{DateTime, Utc};

/// A domain-agnostic notification payload.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
/// - published only **after** the change they describe was committed
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "ledger.transaction.recorded").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the change happened (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
