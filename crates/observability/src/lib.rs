//! Tracing and logging setup shared by every process embedding the ledger.

/// Initialize process-wide logging from `RUST_LOG` with JSON output.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    self::tracing::init_with(&LogSettings::default());
}

pub use self::tracing::{LogFormat, LogSettings, ParseLogFormatError, init_with};

/// Tracing configuration (filters, layers).
pub mod tracing;
