//!
//! Configuration validation for chat-relay.
//!
//! Checks network settings, backend endpoints, deadlines and rate limiting, and
//! reports every finding with a severity so `doctor` can print the full picture
//! while `validate` only fails on errors.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::fmt;

use reqwest::Url;

use crate::config::Config;
use crate::router::CLOUD_MODEL_PREFIX;

/* --- types ----------------------------------------------------------------------------------- */

///
/// How serious a validation finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /** the relay must not start */
    Error,
    /** the relay starts but some behaviour is probably unintended */
    Warning,
    /** worth knowing, nothing to fix */
    Info,
}

///
/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    /** dotted config key, e.g. `local.host` */
    pub field: String,
    pub message: String,
    /** how to fix it, when there is an obvious fix */
    pub suggestion: Option<String>,
}

///
/// Configuration validator collecting every issue in one pass.
pub struct ConfigValidator<'a> {
    /// Configuration to validate
    config: &'a Config,
    /// Issues collected so far
    issues: Vec<ValidationIssue>,
}

/* --- implementations --------------------------------------------------------------------- */

impl fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValidationSeverity::Error => "error",
            ValidationSeverity::Warning => "warning",
            ValidationSeverity::Info => "info",
        };
        f.write_str(label)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.field, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

impl<'a> ConfigValidator<'a> {
    /// Create a new configuration validator
    ///
    /// # Arguments
    /// * `config` - Configuration to validate
    pub fn new(config: &'a Config) -> Self {
        Self { config, issues: Vec::new() }
    }

    /// Run every check and return the findings, errors first
    pub fn collect(mut self) -> Vec<ValidationIssue> {
        self.validate_server_config();
        self.validate_local_config();
        self.validate_cloud_config();
        self.validate_rate_limit_config();

        self.issues.sort_by_key(|issue| match issue.severity {
            ValidationSeverity::Error => 0,
            ValidationSeverity::Warning => 1,
            ValidationSeverity::Info => 2,
        });
        tracing::debug!("Config validation produced {} issue(s)", self.issues.len());
        self.issues
    }

    /* --- private validation methods ------------------------------------------------------ */

    fn validate_server_config(&mut self) {
        let server = &self.config.server;

        if server.port == 0 {
            self.add(
                ValidationSeverity::Error,
                "server.port",
                "port 0 is not a usable listen port".to_string(),
                Some("set PORT to a value between 1 and 65535"),
            );
        }

        if server.heartbeat_interval_ms == 0 {
            self.add(
                ValidationSeverity::Error,
                "server.heartbeat_interval_ms",
                "heartbeat interval must be greater than zero".to_string(),
                Some("15000 keeps most proxies from closing idle streams"),
            );
        }

        if server.body_limit_bytes == 0 {
            self.add(
                ValidationSeverity::Error,
                "server.body_limit_bytes",
                "body limit of zero rejects every chat request".to_string(),
                None,
            );
        }

        if server.allowed_origins.is_empty() {
            self.add(
                ValidationSeverity::Warning,
                "server.allowed_origins",
                "no origins allowed; browser calls from another origin will be rejected"
                    .to_string(),
                Some("set ALLOWED_ORIGINS=https://your-frontend.example"),
            );
        }

        let bad_origins: Vec<String> = server
            .allowed_origins
            .iter()
            .filter(|origin| axum::http::HeaderValue::from_str(origin).is_err())
            .cloned()
            .collect();
        for origin in bad_origins {
            self.add(
                ValidationSeverity::Error,
                "server.allowed_origins",
                format!("origin '{}' is not a valid header value", origin),
                None,
            );
        }
    }

    fn validate_local_config(&mut self) {
        let local = &self.config.local;
        let host = local.host.clone();
        let default_model = local.default_model.clone();
        let timeout_ms = local.timeout_ms;

        self.validate_http_url("local.host", &host);

        if timeout_ms == 0 {
            self.add(
                ValidationSeverity::Error,
                "local.timeout_ms",
                "timeout must be greater than zero".to_string(),
                None,
            );
        }

        if default_model.trim().is_empty() {
            self.add(
                ValidationSeverity::Error,
                "local.default_model",
                "default model name is empty".to_string(),
                Some("set DEFAULT_MODEL to a model installed on the local service"),
            );
        } else if default_model.starts_with(CLOUD_MODEL_PREFIX) {
            self.add(
                ValidationSeverity::Warning,
                "local.default_model",
                format!(
                    "'{}' carries the '{}' prefix, but requests without a model always go to \
                     the local backend",
                    default_model, CLOUD_MODEL_PREFIX
                ),
                Some("name a local model here; clients pick the cloud explicitly"),
            );
        }
    }

    fn validate_cloud_config(&mut self) {
        let cloud = &self.config.cloud;
        let api_base = cloud.api_base.clone();
        let model = cloud.model.clone();
        let timeout_ms = cloud.timeout_ms;

        self.validate_http_url("cloud.api_base", &api_base);

        if model.trim().is_empty() {
            self.add(
                ValidationSeverity::Error,
                "cloud.model",
                "cloud model name is empty".to_string(),
                Some("set GEMINI_MODEL, e.g. gemini-2.0-flash"),
            );
        }

        if timeout_ms == Some(0) {
            self.add(
                ValidationSeverity::Error,
                "cloud.timeout_ms",
                "timeout must be greater than zero".to_string(),
                Some("remove it to reuse local.timeout_ms"),
            );
        }

        if !self.config.cloud_enabled() {
            self.add(
                ValidationSeverity::Info,
                "cloud.api_key",
                "no credential configured; cloud models are disabled".to_string(),
                Some("set GEMINI_API_KEY to enable 'gemini:' models"),
            );
        }
    }

    fn validate_rate_limit_config(&mut self) {
        let limits = &self.config.rate_limit;
        if limits.window_ms <= 0 || limits.max_requests <= 0 {
            self.add(
                ValidationSeverity::Info,
                "rate_limit",
                "rate limiting is disabled".to_string(),
                None,
            );
        }
    }

    /// Require an absolute http(s) URL
    fn validate_http_url(&mut self, field: &str, value: &str) {
        match Url::parse(value) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
            Ok(url) => self.add(
                ValidationSeverity::Error,
                field,
                format!("'{}' must use http or https, got '{}'", value, url.scheme()),
                None,
            ),
            Err(e) => self.add(
                ValidationSeverity::Error,
                field,
                format!("'{}' is not a valid URL: {}", value, e),
                Some("include the scheme, e.g. http://127.0.0.1:11434"),
            ),
        }
    }

    fn add(
        &mut self,
        severity: ValidationSeverity,
        field: &str,
        message: String,
        suggestion: Option<&str>,
    ) {
        self.issues.push(ValidationIssue {
            severity,
            field: field.to_string(),
            message,
            suggestion: suggestion.map(str::to_string),
        });
    }
}

/* --- tests ----------------------------------------------------------------------------------- */
