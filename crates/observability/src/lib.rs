//! Tracing and logging (shared setup).

/// Initialize process-wide tracing/logging.
///
/// Reads `LOG_FORMAT` (`json` or `pretty`) and `RUST_LOG`.
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env());
}

/// Tracing configuration (filters, formats).
pub mod tracing;

pub use tracing::LogFormat;
