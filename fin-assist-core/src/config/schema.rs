//! Configuration schema definitions

use crate::context::ContextPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for fin-assist
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Backend connection
    #[serde(default)]
    pub backend: BackendConfig,
    /// Session handling
    #[serde(default)]
    pub session: SessionConfig,
    /// Context window limits
    #[serde(default)]
    pub context: ContextPolicy,
    /// Chat history persistence
    #[serde(default)]
    pub history: HistoryConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend API connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the assistant API
    #[serde(default = "default_backend_url")]
    pub url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Session handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Verify the stored token before opening the chat. When false the chat
    /// opens immediately and is demoted if verification fails.
    #[serde(default = "default_true")]
    pub verify_before_access: bool,
    /// Token supplied by configuration, takes precedence over storage
    #[serde(default)]
    pub token: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            verify_before_access: true,
            token: None,
        }
    }
}

/// Chat history persistence
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HistoryConfig {
    /// Keep the conversation in `transcript.jsonl` between runs
    #[serde(default)]
    pub save_transcript: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files, relative paths resolve against the config directory
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}
