//! Tracing subscriber setup for the binary.

use crate::config::RuntimeSettings;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `LOG_LEVEL`. `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing(settings: &RuntimeSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("gitops_renderer={}", settings.log_level.to_lowercase()).into());

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.log_format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}
