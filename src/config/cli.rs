//!
//! CLI configuration commands for chat-relay.
//!
//! - `doctor` - environment and configuration health report
//! - `validate` - exit 0 when the configuration has no errors, 1 otherwise
//! - `config show` - effective configuration as TOML, credential masked
//! - `config path` - configuration file search order
//! - `config example` - annotated example TOML
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use crate::config::loader::CONFIG_PATH_ENV;
use crate::config::{Config, ValidationIssue, ValidationSeverity, mask_secret, paths};
use crate::error::{ProxyError, Result};

/* --- types ----------------------------------------------------------------------------------- */

///
/// CLI configuration command handler.
pub struct ConfigCli;

/* --- implementations --------------------------------------------------------------------- */

impl ConfigCli {
    /// Handle the `config show` command
    ///
    /// # Returns
    /// * `Ok(())` - Configuration printed
    /// * `Err(ProxyError)` - Failed to load or serialize configuration
    pub fn show() -> Result<()> {
        let config = Config::load()?;
        println!("{}", Self::render(&config)?);
        Ok(())
    }

    /// Effective configuration as TOML with the credential masked
    pub fn render(config: &Config) -> Result<String> {
        toml::to_string_pretty(&config.redacted())
            .map_err(|e| ProxyError::Config(format!("Failed to serialize configuration: {}", e)))
    }

    /// Handle the `config path` command
    pub fn path() {
        println!("Configuration files (later entries override earlier ones):");
        for path in paths::config_file_paths() {
            let status = if path.exists() { "found" } else { "not found" };
            println!("  {} ({})", path.display(), status);
        }
        println!();
        println!("Set {} to load an additional file.", CONFIG_PATH_ENV);
        println!("Environment variables override every file.");
    }

    /// Handle the `config example` command
    pub fn example() {
        print!("{}", Config::example_toml());
    }

    /// Handle the `validate` command
    ///
    /// # Returns
    /// * process exit code, 0 when no error-level issue exists
    pub fn validate() -> i32 {
        let config = match Config::load() {
            Ok(config) => config,
            Err(e) => {
                eprintln!("[ERROR] Configuration error: {}", e);
                return 1;
            }
        };

        let issues = config.issues();
        let errors: Vec<_> =
            issues.iter().filter(|i| i.severity == ValidationSeverity::Error).collect();

        if errors.is_empty() {
            println!("[OK] Configuration is valid");
            return 0;
        }

        eprintln!("[ERROR] Configuration validation failed:");
        for issue in &errors {
            eprintln!("  - {}: {}", issue.field, issue.message);
            if let Some(suggestion) = &issue.suggestion {
                eprintln!("    Suggestion: {}", suggestion);
            }
        }
        1
    }

    /// Handle the `doctor` command
    ///
    /// Never fails; every problem is reported in the output.
    pub fn doctor() {
        println!("chat-relay doctor - configuration health check");
        println!("{}", "=".repeat(60));
        println!();

        if std::path::Path::new(".env").exists() {
            println!("[OK] Found .env file");
        } else {
            println!("[INFO] No .env file found (using environment variables)");
        }
        println!();

        println!("Configuration files:");
        for path in paths::config_file_paths() {
            let status = if path.exists() { "[OK]  " } else { "[--]  " };
            println!("  {}{}", status, path.display());
        }
        println!();

        let config = match Config::load() {
            Ok(config) => config,
            Err(e) => {
                println!("[ERROR] Failed to load configuration:");
                println!("     {}", e);
                return;
            }
        };

        println!("Effective settings:");
        println!("  listen:        {}:{}", config.server.host, config.server.port);
        println!(
            "  local backend: {} (default model '{}')",
            config.local.host, config.local.default_model
        );
        match config.cloud.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => {
                println!("  cloud backend: {} (key {})", config.cloud.model, mask_secret(key))
            }
            None => println!("  cloud backend: disabled"),
        }
        println!(
            "  rate limit:    {} requests / {} ms",
            config.rate_limit.max_requests, config.rate_limit.window_ms
        );
        println!();

        let issues = config.issues();
        if issues.is_empty() {
            println!("[SUCCESS] No validation issues found.");
            return;
        }

        for (severity, label) in [
            (ValidationSeverity::Error, "ERROR"),
            (ValidationSeverity::Warning, "WARNING"),
            (ValidationSeverity::Info, "INFO"),
        ] {
            let matching: Vec<&ValidationIssue> =
                issues.iter().filter(|i| i.severity == severity).collect();
            if matching.is_empty() {
                continue;
            }
            println!("[{}] {} issue(s):", label, matching.len());
            for issue in matching {
                println!("   - {}: {}", issue.field, issue.message);
                if let Some(suggestion) = &issue.suggestion {
                    println!("     [TIP] {}", suggestion);
                }
            }
            println!();
        }

        if issues.iter().any(|i| i.severity == ValidationSeverity::Error) {
            println!("[ERROR] Configuration has errors. Fix them before starting chat-relay.");
        } else {
            println!("[SUCCESS] Configuration should work. Review the notes above.");
        }
    }
}

/* --- tests ----------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_masks_key() {
        let mut config = Config::default();
        config.cloud.api_key = Some("AIzaSyVerySecret".to_string());
        let rendered = ConfigCli::render(&config).unwrap();
        assert!(rendered.contains("[server]"));
        assert!(!rendered.contains("VerySecret"));
    }

    #[test]
    fn test_render_round_trips_without_key() {
        let rendered = ConfigCli::render(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.local.default_model, "errl-ai");
        assert!(parsed.cloud.api_key.is_none());
    }
}
