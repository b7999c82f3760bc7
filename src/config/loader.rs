//!
//! Configuration loading system for chat-relay.
//!
//! Builder that layers configuration sources in precedence order. Each file layer is
//! deep-merged over the configuration built so far; only keys present in the file
//! change. Environment variables are applied last.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::collections::HashMap;
use std::env;
use std::path::Path;

use crate::config::paths;
use crate::config::{Config, LogLevel};
use crate::error::{ProxyError, Result};

/* --- constants ------------------------------------------------------------------------------ */

/** env var naming an explicit configuration file */
pub const CONFIG_PATH_ENV: &str = "CHAT_RELAY_CONFIG";

/** every environment variable the loader understands */
const KNOWN_ENV_VARS: &[&str] = &[
    "HOST",
    "PORT",
    "LOG_LEVEL",
    "ALLOWED_ORIGINS",
    "HEARTBEAT_INTERVAL_MS",
    "OLLAMA_HOST",
    "DEFAULT_MODEL",
    "OLLAMA_TIMEOUT_MS",
    "OLLAMA_NUM_CTX",
    "OLLAMA_NUM_PREDICT",
    "GEMINI_API_KEY",
    "GEMINI_MODEL",
    "GEMINI_API_BASE",
    "GEMINI_TIMEOUT_MS",
    "RATE_LIMIT_WINDOW_MS",
    "RATE_LIMIT_MAX",
];

/* --- types ----------------------------------------------------------------------------------- */

///
/// Configuration loader implementing the Builder pattern.
///
/// Provides a fluent interface for building configuration from multiple sources
/// in the correct precedence order. Each method returns self for chaining.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Current configuration being built
    config: Config,
    /// Environment variable overrides collected
    env_overrides: HashMap<String, String>,
    /// Whether defaults have been applied
    defaults_applied: bool,
}

/* --- implementations --------------------------------------------------------------------- */

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config: Config::default(), env_overrides: HashMap::new(), defaults_applied: false }
    }

    /// Apply built-in default values
    pub fn with_defaults(mut self) -> Self {
        self.config = Config::default();
        self.defaults_applied = true;
        self
    }

    /// Load the system-wide configuration file, skipping it when absent
    pub fn with_system_config(mut self) -> Result<Self> {
        let system_config_path = paths::system_config_file()?;

        if system_config_path.exists() {
            tracing::debug!("Loading system config from: {}", system_config_path.display());
            self.load_config_file(&system_config_path)?;
        } else {
            tracing::debug!("System config not found at: {}", system_config_path.display());
        }

        Ok(self)
    }

    /// Load the user configuration file, skipping it when absent
    pub fn with_user_config(mut self) -> Result<Self> {
        let Some(user_config_path) = paths::user_config_file() else {
            tracing::debug!("No user config directory on this platform");
            return Ok(self);
        };

        if user_config_path.exists() {
            tracing::debug!("Loading user config from: {}", user_config_path.display());
            self.load_config_file(&user_config_path)?;
        } else {
            tracing::debug!("User config not found at: {}", user_config_path.display());
        }

        Ok(self)
    }

    /// Load the file named by `CHAT_RELAY_CONFIG`; a named file that is missing is an error
    pub fn with_explicit_config(self) -> Result<Self> {
        match env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                let expanded = paths::expand_path(path.trim())?;
                self.with_config_file(expanded)
            }
            _ => Ok(self),
        }
    }

    /// Load configuration from a specific file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading custom config from: {}", path.display());
        self.load_config_file(path)?;
        Ok(self)
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables: HOST, PORT, LOG_LEVEL, ALLOWED_ORIGINS, HEARTBEAT_INTERVAL_MS,
    /// OLLAMA_HOST, DEFAULT_MODEL, OLLAMA_TIMEOUT_MS, OLLAMA_NUM_CTX, OLLAMA_NUM_PREDICT,
    /// GEMINI_API_KEY, GEMINI_MODEL, GEMINI_API_BASE, GEMINI_TIMEOUT_MS,
    /// RATE_LIMIT_WINDOW_MS, RATE_LIMIT_MAX.
    pub fn with_env_vars(mut self) -> Result<Self> {
        tracing::debug!("Loading configuration from environment variables");

        for key in KNOWN_ENV_VARS {
            if let Ok(value) = env::var(key) {
                self.env_overrides.insert((*key).to_string(), value);
            }
        }

        self.apply_env_overrides()?;

        Ok(self)
    }

    /// Build the final configuration
    pub fn build(self) -> Result<Config> {
        if !self.defaults_applied {
            return Err(ProxyError::Config(
                "Configuration loader must call with_defaults() before build()".to_string(),
            ));
        }

        tracing::debug!(
            "Config: server={}:{}, local.host={}, cloud={}, rate_limit={}/{}ms",
            self.config.server.host,
            self.config.server.port,
            self.config.local.host,
            if self.config.cloud_enabled() { "enabled" } else { "disabled" },
            self.config.rate_limit.max_requests,
            self.config.rate_limit.window_ms
        );

        Ok(self.config)
    }

    /* --- private methods ----------------------------------------------------------------- */

    /// Load and merge configuration from a TOML file
    fn load_config_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();

        paths::validate_config_file(path)?;

        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::Config(format!(
                "Failed to read configuration file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let overlay: toml::Table = toml::from_str(&contents).map_err(|e| {
            ProxyError::Config(format!(
                "Failed to parse TOML configuration file '{}': {}\n\
                 \n\
                 Please check the syntax of your configuration file.\n\
                 Run 'chat-relay config example' to see every supported key.",
                path.display(),
                e
            ))
        })?;

        self.merge_table(overlay).map_err(|e| {
            ProxyError::Config(format!("Invalid configuration in '{}': {}", path.display(), e))
        })?;

        tracing::debug!("Successfully loaded config from: {}", path.display());
        Ok(())
    }

    /// Deep-merge a parsed TOML table over the current configuration
    fn merge_table(&mut self, overlay: toml::Table) -> std::result::Result<(), String> {
        let mut base = toml::Table::try_from(&self.config).map_err(|e| e.to_string())?;
        merge_into(&mut base, overlay);
        self.config =
            toml::Value::Table(base).try_into().map_err(|e: toml::de::Error| e.to_string())?;
        Ok(())
    }

    /// Apply environment variable overrides to current configuration
    fn apply_env_overrides(&mut self) -> Result<()> {
        for (key, value) in &self.env_overrides {
            let config = &mut self.config;
            match key.as_str() {
                "HOST" => config.server.host = value.trim().to_string(),
                "PORT" => config.server.port = parse_env(key, value)?,
                "LOG_LEVEL" => config.server.log_level = LogLevel::parse(value)?,
                "ALLOWED_ORIGINS" => config.server.allowed_origins = parse_list(value),
                "HEARTBEAT_INTERVAL_MS" => {
                    config.server.heartbeat_interval_ms = parse_env(key, value)?
                }

                "OLLAMA_HOST" => config.local.host = value.trim().to_string(),
                "DEFAULT_MODEL" => config.local.default_model = value.trim().to_string(),
                "OLLAMA_TIMEOUT_MS" => config.local.timeout_ms = parse_env(key, value)?,
                "OLLAMA_NUM_CTX" => config.local.num_ctx = parse_env(key, value)?,
                "OLLAMA_NUM_PREDICT" => config.local.num_predict = parse_env(key, value)?,

                "GEMINI_API_KEY" => {
                    let key = value.trim();
                    config.cloud.api_key =
                        if key.is_empty() { None } else { Some(key.to_string()) };
                }
                "GEMINI_MODEL" => config.cloud.model = value.trim().to_string(),
                "GEMINI_API_BASE" => config.cloud.api_base = value.trim().to_string(),
                "GEMINI_TIMEOUT_MS" => config.cloud.timeout_ms = Some(parse_env(key, value)?),

                "RATE_LIMIT_WINDOW_MS" => config.rate_limit.window_ms = parse_env(key, value)?,
                "RATE_LIMIT_MAX" => config.rate_limit.max_requests = parse_env(key, value)?,

                _ => tracing::debug!("Ignoring unknown environment variable: {}", key),
            }
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/* --- utility functions ------------------------------------------------------------------- */

/// Recursively merge `overlay` into `base`; overlay scalars and arrays replace base values
fn merge_into(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_into(existing, incoming)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Parse a numeric environment variable, naming the variable on failure
fn parse_env<T>(var_name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        ProxyError::Config(format!("Invalid {} value '{}': {}", var_name, value, e))
    })
}

/// Split a comma-separated list, dropping blanks
fn parse_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

/* --- tests ------------------------------------------------------------------------------- */
