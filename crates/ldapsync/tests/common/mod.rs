//! Shared helpers for the ldapsync test suites.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize logging for tests (once). Set `RUST_LOG` to see sync runs.
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}
