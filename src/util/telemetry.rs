//! Telemetry helpers for structured logging and tracing.

/// Initialize tracing for the service. Embedders can install their own
/// subscriber first; this helper only installs a default env-filtered fmt
/// subscriber (`RUST_LOG`) when none is set.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .try_init();
}
