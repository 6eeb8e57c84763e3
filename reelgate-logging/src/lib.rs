//! Structured logging setup for Reelgate services

use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize structured logging for Reelgate services
///
/// This sets up:
/// - JSON formatted logs (for production)
/// - Environment-based log level filtering
/// - Service name tagging
pub fn init_logging(service_name: &str, default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    tracing::info!(
        service = service_name,
        "Logging initialized"
    );
}

/// Initialize simple console logging (for development)
pub fn init_console_logging(service_name: &str, default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(
        service = service_name,
        "Console logging initialized"
    );
}

/// Pick the JSON or console subscriber
pub fn init_service_logging(service_name: &str, default_level: &str, json: bool) {
    if json {
        init_logging(service_name, default_level);
    } else {
        init_console_logging(service_name, default_level);
    }
}

/// `RUST_LOG` wins over the configured default
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level))
}
