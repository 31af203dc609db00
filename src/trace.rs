//! Opt-in tracing subscriber setup.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the embedder. This helper wires a sensible default for
//! binaries and tests: env-filtered fmt output honoring `APPSHELF_LOG`
//! (falling back to `RUST_LOG`, then to `info`).

use tracing_subscriber::EnvFilter;

/// Install the default subscriber for the whole process.
///
/// Safe to call more than once; later calls are no-ops because a global
/// subscriber can only be installed a single time.
pub fn init() {
    let filter = std::env::var("APPSHELF_LOG")
        .ok()
        .filter(|v| !v.is_empty())
        .map_or_else(
            || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            EnvFilter::new,
        );
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_is_idempotent() {
        super::init();
        super::init();
    }
}
