use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "beacon_client=debug,beacon_store=info,warn";

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// filter. Calling this again, or after the host installed its own
/// subscriber, is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
