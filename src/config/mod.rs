//!
//! Configuration management for chat-relay.
//!
//! Layered configuration built from:
//! - Built-in defaults
//! - System config file (/etc/chat-relay/config.toml)
//! - User config file (platform-native config directory)
//! - Explicit config file named by `CHAT_RELAY_CONFIG`
//! - Environment variables (including a `.env` file loaded by the binary)
//!
//! Submodules:
//! - `loader.rs` - layered loading
//! - `paths.rs` - path resolution and expansion
//! - `validation.rs` - configuration validation
//! - `cli.rs` - `config` subcommands
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- modules --------------------------------------------------------------------------------- */

pub mod cli;
pub mod loader;
pub mod paths;
pub mod validation;

/* --- uses ------------------------------------------------------------------------------------ */

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, Result};

pub use validation::{ValidationIssue, ValidationSeverity};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Main application configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Local token-generation service (Ollama)
    pub local: LocalBackendConfig,
    /// Cloud generation API (Gemini)
    pub cloud: CloudBackendConfig,
    /// Per-client fixed-window rate limiting
    pub rate_limit: RateLimitConfig,
}

///
/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// HTTP server port number
    pub port: u16,
    /// Application logging level
    pub log_level: LogLevel,
    /// Origins allowed to make cross-origin browser calls
    pub allowed_origins: Vec<String>,
    /// Maximum accepted request body size
    pub body_limit_bytes: usize,
    /// Interval between keep-alive filler lines on event streams
    pub heartbeat_interval_ms: u64,
}

///
/// Local backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalBackendConfig {
    /// Base URL of the service, without the `/api/...` path
    pub host: String,
    /// Model used when a request names none
    pub default_model: String,
    /// Deadline for one chat request, streaming included
    pub timeout_ms: u64,
    /// Context window size; sent only when positive
    pub num_ctx: i64,
    /// Output token cap; sent only when positive
    pub num_predict: i64,
}

///
/// Cloud backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudBackendConfig {
    /// API credential; the cloud backend is disabled while unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model used when the prefixed identifier names none
    pub model: String,
    /// API base URL
    pub api_base: String,
    /// Deadline for one cloud call; falls back to `local.timeout_ms`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

///
/// Fixed-window rate limit. A non-positive value in either field disables limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_ms: i64,
    pub max_requests: i64,
}

///
/// Logging level enumeration.
///
/// Defines available log levels compatible with tracing crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/* --- defaults -------------------------------------------------------------------------------- */

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3033,
            log_level: LogLevel::Info,
            allowed_origins: Vec::new(),
            body_limit_bytes: 1024 * 1024,
            heartbeat_interval_ms: 15_000,
        }
    }
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            host: "http://127.0.0.1:11434".to_string(),
            default_model: "errl-ai".to_string(),
            timeout_ms: 120_000,
            num_ctx: 1024,
            num_predict: 128,
        }
    }
}

impl Default for CloudBackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.0-flash".to_string(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_ms: None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { window_ms: 60_000, max_requests: 30 }
    }
}

/* --- implementations --------------------------------------------------------------------- */

impl Config {
    /// Load configuration from the standard hierarchy:
    /// 1. Environment variables (highest priority)
    /// 2. File named by `CHAT_RELAY_CONFIG`
    /// 3. User config file
    /// 4. System config file
    /// 5. Built-in defaults (lowest priority)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded configuration
    /// * `Err(ProxyError)` - A config source exists but could not be read or parsed
    pub fn load() -> Result<Self> {
        loader::ConfigLoader::new()
            .with_defaults()
            .with_system_config()?
            .with_user_config()?
            .with_explicit_config()?
            .with_env_vars()?
            .build()
    }

    /// Validate the current configuration, failing on error-level issues
    pub fn validate(&self) -> Result<()> {
        let issues = self.issues();
        for issue in issues.iter().filter(|i| i.severity == ValidationSeverity::Warning) {
            tracing::warn!("Configuration warning: {}: {}", issue.field, issue.message);
        }

        let errors: Vec<_> =
            issues.iter().filter(|i| i.severity == ValidationSeverity::Error).collect();
        if errors.is_empty() {
            return Ok(());
        }

        Err(ProxyError::Config(format!(
            "Configuration validation failed with {} error(s):\n\n{}\n\n\
             Run 'chat-relay doctor' for details.",
            errors.len(),
            errors
                .iter()
                .enumerate()
                .map(|(i, e)| format!("{}. {}: {}", i + 1, e.field, e.message))
                .collect::<Vec<_>>()
                .join("\n")
        )))
    }

    /// Every validation issue, whatever its severity
    pub fn issues(&self) -> Vec<ValidationIssue> {
        validation::ConfigValidator::new(self).collect()
    }

    /// Whether the cloud backend has a credential
    pub fn cloud_enabled(&self) -> bool {
        self.cloud.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    pub fn local_timeout(&self) -> Duration {
        Duration::from_millis(self.local.timeout_ms)
    }

    pub fn cloud_timeout(&self) -> Duration {
        Duration::from_millis(self.cloud.timeout_ms.unwrap_or(self.local.timeout_ms))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.server.heartbeat_interval_ms)
    }

    /// Copy of the configuration that is safe to print
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(key) = copy.cloud.api_key.as_mut() {
            *key = mask_secret(key);
        }
        copy
    }

    /// Get configuration file example as TOML string
    pub fn example_toml() -> &'static str {
        r#"# chat-relay configuration
# Locations checked (later wins):
#   /etc/chat-relay/config.toml
#   ~/.config/chat-relay/config.toml (platform config directory)
#   $CHAT_RELAY_CONFIG
# Environment variables override every file.

[server]
host = "127.0.0.1"                  # HOST
port = 3033                         # PORT
log_level = "info"                  # LOG_LEVEL: trace, debug, info, warn, error
allowed_origins = []                # ALLOWED_ORIGINS (comma-separated)
body_limit_bytes = 1048576
heartbeat_interval_ms = 15000       # HEARTBEAT_INTERVAL_MS

[local]
host = "http://127.0.0.1:11434"     # OLLAMA_HOST
default_model = "errl-ai"           # DEFAULT_MODEL
timeout_ms = 120000                 # OLLAMA_TIMEOUT_MS
num_ctx = 1024                      # OLLAMA_NUM_CTX (<= 0 omits it)
num_predict = 128                   # OLLAMA_NUM_PREDICT (<= 0 omits it)

[cloud]
# api_key = "..."                   # GEMINI_API_KEY (cloud backend disabled when unset)
model = "gemini-2.0-flash"          # GEMINI_MODEL
api_base = "https://generativelanguage.googleapis.com/v1beta"  # GEMINI_API_BASE
# timeout_ms = 120000               # GEMINI_TIMEOUT_MS (defaults to local.timeout_ms)

[rate_limit]
window_ms = 60000                   # RATE_LIMIT_WINDOW_MS (<= 0 disables)
max_requests = 30                   # RATE_LIMIT_MAX (<= 0 disables)
"#
    }
}

impl LogLevel {
    /// Convert to tracing::Level for logging setup
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ProxyError::Config(format!(
                "Invalid log level '{}'. Valid levels are: trace, debug, info, warn, error",
                s
            ))),
        }
    }
}

/// Keep the first four characters of a secret and hide the rest
pub fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{}... ({} chars)", visible, secret.chars().count())
}
