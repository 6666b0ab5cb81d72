// Console telemetry for the demo process
//
// The engine library only emits tracing events; this module installs the
// subscriber that prints them.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup line
    pub service_name: String,
    /// Log filter (e.g., "info", "domain_sync=trace")
    pub log_filter: Option<String>,
    /// Include module targets in log lines
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "domain-sync-demo".to_string(),
            log_filter: None,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `SERVICE_NAME`: Service name (default: "domain-sync-demo")
    /// - `RUST_LOG`: Full filter directive
    /// - `LOG_LEVEL`: Level for the engine and demo crates when `RUST_LOG` is unset
    pub fn from_env() -> Self {
        let log_filter = std::env::var("RUST_LOG").ok().or_else(|| {
            std::env::var("LOG_LEVEL")
                .ok()
                .map(|level| default_filter(&level))
        });

        Self {
            service_name: std::env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "domain-sync-demo".to_string()),
            log_filter,
            ..Default::default()
        }
    }
}

fn default_filter(level: &str) -> String {
    format!("domain_sync={level},domain_sync_demo={level}")
}

/// Install the console subscriber
///
/// An unparsable filter falls back to `domain_sync=debug`.
pub fn init_telemetry(config: TelemetryConfig) {
    let filter = config
        .log_filter
        .as_ref()
        .and_then(|f| EnvFilter::try_new(f).ok())
        .unwrap_or_else(|| EnvFilter::new(default_filter("debug")));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(config.with_target)
        .with_filter(filter);

    tracing_subscriber::registry().with(console_layer).init();

    tracing::debug!(service = %config.service_name, "Console telemetry enabled");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_covers_both_crates() {
        assert_eq!(
            default_filter("info"),
            "domain_sync=info,domain_sync_demo=info"
        );
        assert!(EnvFilter::try_new(default_filter("trace")).is_ok());
    }
}
