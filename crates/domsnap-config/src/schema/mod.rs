//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod schema_capture;

pub use schema_capture::*;

/// Shared default helper used by submodules.
pub(crate) fn default_true() -> bool {
    true
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub action: ActionConfig,

    #[serde(default)]
    pub serialize: SerializeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Browser (CDP) connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// DevTools endpoint, either the HTTP discovery URL or a `ws://` page URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_endpoint() -> String {
    "http://localhost:9222".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Attribute filter used when rendering a snapshot as text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializeConfig {
    #[serde(default = "default_include_attributes")]
    pub include_attributes: Vec<String>,
}

fn default_include_attributes() -> Vec<String> {
    [
        "id",
        "name",
        "type",
        "role",
        "aria-label",
        "placeholder",
        "value",
        "alt",
        "title",
        "href",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for SerializeConfig {
    fn default() -> Self {
        Self {
            include_attributes: default_include_attributes(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,

    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("~/.domsnap/logs")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            directory: default_log_directory(),
        }
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
