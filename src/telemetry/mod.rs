//! Logging and lightweight metrics for the bridge
//!
//! Everything in the crate logs through `tracing`. This module installs a
//! `tracing-subscriber` fmt subscriber for binaries and tests that want output,
//! and provides helpers that emit metric events on the `metrics` target.

use std::time::Instant;

use tracing_subscriber::EnvFilter;

use crate::config::LoggerSettings;
use crate::utils::error::{McpError, McpResult};

/// Configuration for the telemetry system
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Name of the service, attached to the startup event
    pub service_name: String,
    /// Colored output
    pub enable_ansi: bool,
    /// Default filter directive when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "mcp-app-bridge".to_string(),
            enable_ansi: true,
            log_level: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Telemetry config from the logger section of the settings file
    pub fn from_logger(service_name: &str, logger: &LoggerSettings) -> Self {
        Self {
            service_name: service_name.to_string(),
            enable_ansi: logger.ansi,
            log_level: logger.level.clone(),
        }
    }
}

/// Installs the global subscriber
///
/// `RUST_LOG` overrides the configured level. Fails if a global subscriber is
/// already installed.
pub fn init_telemetry(config: TelemetryConfig) -> McpResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| McpError::Config(format!("Invalid log level {}: {}", config.log_level, e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(config.enable_ansi)
        .try_init()
        .map_err(|e| McpError::Config(format!("Failed to initialize telemetry: {}", e)))?;

    tracing::debug!(service = %config.service_name, "telemetry initialized");
    Ok(())
}

/// Records a single metric with tags
pub fn add_metric(name: &str, value: f64, tags: &[(&str, String)]) {
    let tags_str = tags
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",");

    tracing::info!(
        target: "metrics",
        metric_name = %name,
        metric_value = %value,
        metric_tags = %tags_str,
        "Recorded metric"
    );
}

/// A span duration tracker for measuring operation durations
pub fn span_duration(name: &'static str) -> impl Drop {
    let start = Instant::now();
    struct Guard {
        name: &'static str,
        start: Instant,
    }

    impl Drop for Guard {
        fn drop(&mut self) {
            let duration = self.start.elapsed();
            tracing::debug!(
                target: "metrics",
                duration_ms = duration.as_millis() as f64,
                operation = self.name,
                "Operation completed"
            );
        }
    }

    Guard { name, start }
}
