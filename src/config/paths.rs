//!
//! Platform-native path resolution for chat-relay configuration.
//!
//! - Linux/Unix: XDG config directory (~/.config/chat-relay) and /etc/chat-relay
//! - macOS: ~/Library/Application Support and /Library/Preferences
//! - Windows: %APPDATA% and %PROGRAMDATA%
//!
//! Lookups never create directories; the relay only reads configuration.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use crate::error::{ProxyError, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/* --- constants ------------------------------------------------------------------------------- */

/// Application name for directory resolution
const APP_NAME: &str = "chat-relay";
/// Organization qualifier for directory resolution
const ORGANIZATION: &str = "com";
/// Organization name for directory resolution
const ORG_NAME: &str = "SkyCorp";
/// File name looked up in every configuration directory
const CONFIG_FILE_NAME: &str = "config.toml";

/* --- public functions ------------------------------------------------------------------------ */

/// Get the user configuration file path
///
/// - Linux: ~/.config/chat-relay/config.toml
/// - macOS: ~/Library/Application Support/com.SkyCorp.chat-relay/config.toml
/// - Windows: %APPDATA%/SkyCorp/chat-relay/config/config.toml
///
/// # Returns
/// * `Some(PathBuf)` - Where the user file would live; it may not exist
/// * `None` - No home directory could be determined
pub fn user_config_file() -> Option<PathBuf> {
    ProjectDirs::from(ORGANIZATION, ORG_NAME, APP_NAME)
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Get the system configuration directory
///
/// # Returns
/// * `Ok(PathBuf)` - Path to system configuration directory
/// * `Err(ProxyError)` - Unable to determine system config directory
pub fn system_config_dir() -> Result<PathBuf> {
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        Ok(PathBuf::from("/etc").join(APP_NAME))
    }

    #[cfg(target_os = "macos")]
    {
        Ok(PathBuf::from("/Library/Preferences").join(APP_NAME))
    }

    #[cfg(windows)]
    {
        std::env::var("PROGRAMDATA").map(|path| PathBuf::from(path).join(APP_NAME)).map_err(|_| {
            ProxyError::Config("PROGRAMDATA environment variable not found".to_string())
        })
    }
}

/// Get the system configuration file path
pub fn system_config_file() -> Result<PathBuf> {
    Ok(system_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Expand `~` and `$VAR` references in a file path
///
/// # Arguments
/// * `path` - Path string that may contain ~ or environment variables
///
/// # Returns
/// * `Ok(PathBuf)` - Expanded path
/// * `Err(ProxyError)` - Home directory unknown or a referenced variable is unset
pub fn expand_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path_str = path.as_ref().to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("~/") {
        return directories::UserDirs::new().map(|dirs| dirs.home_dir().join(rest)).ok_or_else(
            || {
                ProxyError::Config(
                    "Unable to determine user home directory for tilde expansion".to_string(),
                )
            },
        );
    }

    if path_str.contains('$') {
        let expanded = shellexpand::full(&path_str).map_err(|e| {
            ProxyError::Config(format!(
                "Failed to expand environment variables in path '{}': {}",
                path_str, e
            ))
        })?;
        return Ok(PathBuf::from(expanded.as_ref()));
    }

    Ok(path.as_ref().to_path_buf())
}

/// Check that a configuration file exists, is a regular file and is readable
///
/// # Arguments
/// * `path` - Path to configuration file to check
///
/// # Returns
/// * `Ok(())` - File exists and is readable
/// * `Err(ProxyError)` - File doesn't exist, isn't readable, or is a directory
pub fn validate_config_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ProxyError::Config(format!(
            "Configuration file '{}' does not exist",
            path.display()
        )));
    }

    if !path.is_file() {
        return Err(ProxyError::Config(format!(
            "Configuration path '{}' exists but is not a regular file",
            path.display()
        )));
    }

    std::fs::File::open(path).map_err(|e| {
        ProxyError::Config(format!(
            "Configuration file '{}' exists but cannot be read: {}\n\
             \n\
             You can fix this with: chmod 644 '{}'",
            path.display(),
            e,
            path.display()
        ))
    })?;

    Ok(())
}

/// Get every configuration file location in load order (later entries win)
///
/// 1. System configuration file
/// 2. User configuration file
/// 3. File named by `CHAT_RELAY_CONFIG`, when set
pub fn config_file_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(system_config) = system_config_file() {
        paths.push(system_config);
    }

    if let Some(user_config) = user_config_file() {
        paths.push(user_config);
    }

    if let Ok(explicit) = std::env::var(super::loader::CONFIG_PATH_ENV)
        && !explicit.trim().is_empty()
        && let Ok(expanded) = expand_path(explicit.trim())
    {
        paths.push(expanded);
    }

    paths
}

/* --- tests ----------------------------------------------------------------------------------- */
