//! Tracing subscriber bootstrap.
//!
//! An `EnvFilter` driven by `CENTINEL_LOG` (falling back to `info`), writing
//! to stdout in a compact, timestamped format.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global tracing subscriber. Idempotent: a second call is a
/// no-op (returns `Err` from `try_init` which we swallow) so tests that spin
/// up multiple engine instances in one process don't panic.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("CENTINEL_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .try_init();
}
