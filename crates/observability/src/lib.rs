//! Process-wide logging setup shared by every binary in the workspace.

/// Initialize process-wide tracing with the given settings.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(config: &LogConfig) {
    tracing::init(config);
}

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use self::tracing::LogConfig;
