use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::mcp::lifecycle::LATEST_PROTOCOL_VERSION;
use crate::utils::error::{McpError, McpResult};

/// Settings for the app bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Identity announced in `ui/initialize`
    #[serde(default)]
    pub app: AppSettings,

    /// Protocol version requested from the host
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,

    /// Only accept messages from this origin; absent or `"*"` accepts any
    #[serde(default)]
    pub peer_origin: Option<String>,

    /// Deadline for the `ui/initialize` round trip
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Logger settings
    #[serde(default)]
    pub logger: LoggerSettings,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            app: AppSettings::default(),
            protocol_version: default_protocol_version(),
            peer_origin: None,
            handshake_timeout_ms: default_handshake_timeout_ms(),
            logger: LoggerSettings::default(),
        }
    }
}

/// App identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Display name
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Version string
    #[serde(default = "default_app_version")]
    pub version: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
        }
    }
}

/// Logger settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Colored output
    #[serde(default = "default_ansi")]
    pub ansi: bool,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: default_ansi(),
        }
    }
}

fn default_protocol_version() -> String {
    LATEST_PROTOCOL_VERSION.to_string()
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_app_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ansi() -> bool {
    true
}

/// Load settings from a YAML file
pub fn load_settings<P: AsRef<Path>>(path: P) -> McpResult<BridgeSettings> {
    let mut file = File::open(path)
        .map_err(|e| McpError::Config(format!("Failed to open config file: {}", e)))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| McpError::Config(format!("Failed to read config file: {}", e)))?;

    let settings: BridgeSettings = serde_yaml::from_str(&contents)
        .map_err(|e| McpError::Config(format!("Failed to parse config file: {}", e)))?;

    Ok(settings)
}

/// Get settings, optionally from a specific file
pub fn get_settings(config_path: Option<&str>) -> McpResult<BridgeSettings> {
    match config_path {
        Some(path) => load_settings(path),
        None => {
            let default_paths = [
                "mcp_app_bridge.config.yaml",
                "config/mcp_app_bridge.config.yaml",
            ];

            for path in default_paths {
                if Path::new(path).exists() {
                    return load_settings(path);
                }
            }

            Ok(BridgeSettings::default())
        }
    }
}
