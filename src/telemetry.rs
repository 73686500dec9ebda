//! Tracing setup for harness users and tests

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber for the harness
///
/// `RUST_LOG` wins over the default `workflow_harness=info` (or `debug` when
/// `verbose`). Calling this again is a no-op, so every test may call it.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "workflow_harness=debug"
        } else {
            "workflow_harness=info"
        })
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
