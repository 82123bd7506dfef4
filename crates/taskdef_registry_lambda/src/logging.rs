use std::sync::Once;

use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "info";

static INIT: Once = Once::new();

/// Installs a JSON-lines subscriber for CloudWatch. Level comes from
/// `RUST_LOG`. Only the first call installs anything.
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

        let installed = tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_target(false)
            .with_ansi(false)
            .with_env_filter(filter)
            .try_init();

        // tracing is not up yet, so stderr is the only place to report this.
        if let Err(error) = installed {
            eprintln!("failed to install JSON log subscriber: {error}");
        }
    });
}
