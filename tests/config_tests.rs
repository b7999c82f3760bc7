//! Configuration module tests
//!
//! Tests for layered configuration loading: defaults, TOML files and environment
//! variable overrides.
//!
//! Uses temp-env to manage environment variables during tests, restoring them after
//! each test completes, and tempfile for throwaway configuration files.

use std::io::Write;

use chat_relay::config::loader::{CONFIG_PATH_ENV, ConfigLoader};
use chat_relay::config::{Config, LogLevel};
use temp_env::with_vars;
use tempfile::NamedTempFile;
use tokio_test::{assert_err, assert_ok};

/// Every variable the loader reads, cleared so the host environment cannot leak in
const RELAY_VARS: &[&str] = &[
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
    CONFIG_PATH_ENV,
];

/// Run `f` with every relay variable unset except those in `set`
fn with_relay_env<F: FnOnce()>(set: &[(&str, &str)], f: F) {
    let vars: Vec<(&str, Option<&str>)> = RELAY_VARS
        .iter()
        .map(|name| (*name, set.iter().find(|(k, _)| k == name).map(|(_, v)| *v)))
        .collect();
    with_vars(vars, f);
}

fn env_only() -> chat_relay::error::Result<Config> {
    ConfigLoader::new().with_defaults().with_env_vars()?.build()
}

fn toml_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix(".toml").unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

/// Defaults apply when nothing is configured
#[test]
fn test_defaults_without_environment() {
    with_relay_env(&[], || {
        let config = assert_ok!(env_only());
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3033);
        assert_eq!(config.server.log_level, LogLevel::Info);
        assert!(config.server.allowed_origins.is_empty());
        assert_eq!(config.server.heartbeat_interval_ms, 15_000);
        assert_eq!(config.local.host, "http://127.0.0.1:11434");
        assert_eq!(config.local.default_model, "errl-ai");
        assert_eq!(config.local.timeout_ms, 120_000);
        assert_eq!(config.local.num_ctx, 1024);
        assert_eq!(config.local.num_predict, 128);
        assert_eq!(config.cloud.model, "gemini-2.0-flash");
        assert!(!config.cloud_enabled());
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert_eq!(config.rate_limit.max_requests, 30);
    });
}

/// Environment variables override every default
#[test]
fn test_env_overrides() {
    with_relay_env(
        &[
            ("HOST", "0.0.0.0"),
            ("PORT", "8080"),
            ("LOG_LEVEL", "debug"),
            ("ALLOWED_ORIGINS", " https://a.example , https://b.example ,"),
            ("OLLAMA_HOST", "http://gpu-box:11434"),
            ("DEFAULT_MODEL", "llama3"),
            ("OLLAMA_NUM_CTX", "0"),
            ("OLLAMA_NUM_PREDICT", "-1"),
            ("GEMINI_API_KEY", "secret"),
            ("GEMINI_TIMEOUT_MS", "5000"),
            ("RATE_LIMIT_MAX", "0"),
        ],
        || {
            let config = assert_ok!(env_only());
            assert_eq!(config.server.host, "0.0.0.0");
            assert_eq!(config.server.port, 8080);
            assert_eq!(config.server.log_level, LogLevel::Debug);
            assert_eq!(config.server.allowed_origins, ["https://a.example", "https://b.example"]);
            assert_eq!(config.local.host, "http://gpu-box:11434");
            assert_eq!(config.local.default_model, "llama3");
            assert_eq!(config.local.num_ctx, 0);
            assert_eq!(config.local.num_predict, -1);
            assert!(config.cloud_enabled());
            assert_eq!(config.cloud_timeout().as_millis(), 5000);
            assert_eq!(config.rate_limit.max_requests, 0);
        },
    );
}

/// An empty key leaves the cloud backend disabled
#[test]
fn test_empty_gemini_key_is_unset() {
    with_relay_env(&[("GEMINI_API_KEY", "  ")], || {
        let config = env_only().unwrap();
        assert_eq!(config.cloud.api_key, None);
        assert!(!config.cloud_enabled());
    });
}

/// Cloud timeout falls back to the local timeout
#[test]
fn test_cloud_timeout_falls_back_to_local() {
    with_relay_env(&[("OLLAMA_TIMEOUT_MS", "9000")], || {
        let config = env_only().unwrap();
        assert_eq!(config.cloud_timeout(), config.local_timeout());
        assert_eq!(config.local_timeout().as_millis(), 9000);
    });
}

/// Invalid numeric values name the offending variable
#[test]
fn test_invalid_number_names_variable() {
    with_relay_env(&[("PORT", "not-a-port")], || {
        let err = assert_err!(env_only());
        assert!(err.to_string().contains("PORT"), "got: {}", err);
    });

    with_relay_env(&[("OLLAMA_TIMEOUT_MS", "soon")], || {
        let err = assert_err!(env_only());
        assert!(err.to_string().contains("OLLAMA_TIMEOUT_MS"), "got: {}", err);
    });
}

/// Invalid log levels are rejected
#[test]
fn test_invalid_log_level_rejected() {
    with_relay_env(&[("LOG_LEVEL", "verbose")], || {
        assert_err!(env_only());
    });
}

/// A TOML file is merged over defaults, leaving unnamed keys untouched
#[test]
fn test_file_merges_over_defaults() {
    let file = toml_file(
        r#"
[server]
port = 4000
allowed_origins = ["https://chat.example"]

[local]
default_model = "mistral"
"#,
    );

    with_relay_env(&[], || {
        let config = ConfigLoader::new()
            .with_defaults()
            .with_config_file(file.path())
            .unwrap()
            .with_env_vars()
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.allowed_origins, ["https://chat.example"]);
        assert_eq!(config.local.default_model, "mistral");
        assert_eq!(config.local.host, "http://127.0.0.1:11434");
        assert_eq!(config.rate_limit.max_requests, 30);
    });
}

/// Environment variables win over file values
#[test]
fn test_env_wins_over_file() {
    let file = toml_file("[server]\nport = 4000\n");

    with_relay_env(&[("PORT", "5000")], || {
        let config = ConfigLoader::new()
            .with_defaults()
            .with_config_file(file.path())
            .unwrap()
            .with_env_vars()
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.server.port, 5000);
    });
}

/// The file named by CHAT_RELAY_CONFIG is loaded
#[test]
fn test_explicit_config_env() {
    let file = toml_file("[rate_limit]\nmax_requests = 7\n");
    let path = file.path().to_str().unwrap().to_string();

    with_relay_env(&[(CONFIG_PATH_ENV, path.as_str())], || {
        let config =
            ConfigLoader::new().with_defaults().with_explicit_config().unwrap().build().unwrap();
        assert_eq!(config.rate_limit.max_requests, 7);
    });
}

/// A named file that does not exist is an error, not a silent default
#[test]
fn test_missing_explicit_config_is_error() {
    with_relay_env(&[(CONFIG_PATH_ENV, "/definitely/not/here/chat-relay.toml")], || {
        let result = ConfigLoader::new().with_defaults().with_explicit_config();
        assert!(result.is_err());
    });
}

/// Malformed TOML reports the file
#[test]
fn test_malformed_toml_is_error() {
    let file = toml_file("[server\nport = ");

    let err = ConfigLoader::new().with_defaults().with_config_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse TOML"), "got: {}", err);
}

/// A value of the wrong type is rejected
#[test]
fn test_wrong_type_is_error() {
    let file = toml_file("[server]\nport = \"eighty\"\n");

    let result = ConfigLoader::new().with_defaults().with_config_file(file.path());
    assert!(result.is_err());
}

/// The annotated example parses into a configuration equal to the defaults' shape
#[test]
fn test_example_toml_parses() {
    let config: Config = toml::from_str(Config::example_toml()).expect("example should parse");
    assert_eq!(config.server.port, Config::default().server.port);
}

/// The printable copy never exposes the credential
#[test]
fn test_redacted_masks_key() {
    let mut config = Config::default();
    config.cloud.api_key = Some("AIzaSyVerySecretValue".to_string());

    let shown = config.redacted();
    let masked = shown.cloud.api_key.unwrap();
    assert!(!masked.contains("VerySecret"));
    assert_eq!(config.cloud.api_key.as_deref(), Some("AIzaSyVerySecretValue"));
}

/// Build without defaults is refused
#[test]
fn test_build_requires_defaults() {
    assert!(ConfigLoader::new().build().is_err());
}
