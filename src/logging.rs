use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

use crate::config::DEFAULT_LOG_FILTER;

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Installs the stderr subscriber. Later calls do nothing.
///
/// An unparsable filter falls back to the default level.
pub fn init(filter: &str) {
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

        // Another subscriber (e.g. from a test harness) may already be set.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}
