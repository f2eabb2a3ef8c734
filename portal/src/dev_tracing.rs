//! Development logging helpers.
//!
//! Portals log lifecycle events (`bind`, `connect`, peer add/remove, close)
//! at `debug` and per-message paths at `trace`, each prefixed with the
//! component in brackets (`[PORTAL]`, `[BROKER]`, `[PUB]`, ...).

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`.
///
/// Tests can call `portal::dev_tracing::init_tracing()` to enable structured
/// logging for debugging. This is a no-op when `RUST_LOG` is not set or when
/// a global subscriber is already installed.
pub fn init_tracing() {
    if std::env::var_os("RUST_LOG").is_some() {
        install(EnvFilter::from_default_env());
    }
}

/// Install a fmt subscriber with explicit filter directives, such as
/// `"portal_core=debug,portal_proto=trace"`.
///
/// No-op when a global subscriber is already installed.
pub fn init_tracing_with(directives: &str) {
    install(EnvFilter::new(directives));
}

fn install(filter: EnvFilter) {
    // Best-effort: another subscriber may already be set.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
