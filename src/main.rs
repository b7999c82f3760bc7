//! # chat-relay - streaming chat proxy server
//!
//! Accepts chat requests from a single trusted frontend and relays them to a local
//! Ollama service or, for `gemini:`-prefixed models, to the Gemini API. Both
//! backends are presented to the client as one server-sent-events protocol.
//!
//! ## Configuration
//!
//! Layered: built-in defaults, `/etc/chat-relay/config.toml`, the user config file,
//! the file named by `CHAT_RELAY_CONFIG`, then environment variables (a `.env` file
//! in the working directory is loaded first).
//!
//! ```bash
//! export OLLAMA_HOST=http://127.0.0.1:11434
//! export DEFAULT_MODEL=errl-ai
//! export GEMINI_API_KEY=...            # optional, enables gemini: models
//! export ALLOWED_ORIGINS=https://chat.example
//! chat-relay
//! ```
//!
//! Authors: Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp
//!

/* --- uses ------------------------------------------------------------------------------------ */

use std::env;
use std::net::SocketAddr;

use axum::Router;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use chat_relay::config::Config;
use chat_relay::config::cli::ConfigCli;
use chat_relay::error::{ProxyError, Result};

/* --- constants ------------------------------------------------------------------------------ */

/** the version as defined in cargo.toml */
const VERSION: &str = env!("CARGO_PKG_VERSION");

/* --- start of code -------------------------------------------------------------------------- */

///
/// Main application entry point.
///
/// Loads `.env`, handles CLI commands, then loads configuration, initializes
/// logging and serves until the process is stopped.
#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Handle CLI arguments before serving
    handle_cli_args();

    if let Err(e) = run().await {
        let error_msg = format!("{}", e);
        eprintln!("Error:");
        for line in error_msg.lines() {
            eprintln!("{}", line);
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::load()?;
    initialize_logging(&config);
    config.validate()?;

    let app = chat_relay::create_app(config.clone())?;

    start_server(&config, app).await
}

///
/// Handle command line arguments; every recognised command exits the process.
fn handle_cli_args() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return;
    }

    match args[1].as_str() {
        "--version" | "-V" => {
            println!("chat-relay {}", VERSION);
            std::process::exit(0);
        }
        "--help" | "-h" => {
            print_help();
            std::process::exit(0);
        }
        "doctor" => {
            ConfigCli::doctor();
            std::process::exit(0);
        }
        "validate" => {
            std::process::exit(ConfigCli::validate());
        }
        "config" => {
            std::process::exit(run_config_command(args.get(2).map(String::as_str)));
        }
        other => {
            let kind = if other.starts_with('-') { "option" } else { "command" };
            eprintln!("Error: Unknown {}: {}", kind, other);
            eprintln!();
            print_help();
            std::process::exit(1);
        }
    }
}

///
/// Dispatch `config <subcommand>`.
///
/// # Returns
///  * process exit code
fn run_config_command(subcommand: Option<&str>) -> i32 {
    match subcommand {
        Some("show") => match ConfigCli::show() {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Some("path") => {
            ConfigCli::path();
            0
        }
        Some("example") => {
            ConfigCli::example();
            0
        }
        Some(other) => {
            eprintln!("Error: Unknown config command: {}", other);
            eprintln!();
            print_help();
            1
        }
        None => {
            eprintln!("Error: Missing config command (show, path, example)");
            eprintln!();
            print_help();
            1
        }
    }
}

///
/// Print help information for the chat-relay CLI.
fn print_help() {
    println!("chat-relay v{}", VERSION);
    println!("Streaming chat proxy for a local Ollama service and the Gemini API");
    println!();
    println!("USAGE:");
    println!("    chat-relay [COMMAND] [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    doctor              Check configuration and environment health");
    println!("    validate            Validate configuration and exit (0 = valid)");
    println!("    config show         Print the effective configuration (credential masked)");
    println!("    config path         List configuration file locations");
    println!("    config example      Print an annotated example configuration");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help          Print help information");
    println!("    -V, --version       Print version information");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("    HOST, PORT                  Listen address (default: 127.0.0.1:3033)");
    println!("    LOG_LEVEL                   trace, debug, info, warn, error (default: info)");
    println!("    ALLOWED_ORIGINS             Comma-separated CORS allow-list");
    println!("    HEARTBEAT_INTERVAL_MS       Event-stream keep-alive interval (default: 15000)");
    println!("    OLLAMA_HOST                 Local backend URL (default: http://127.0.0.1:11434)");
    println!("    DEFAULT_MODEL               Model used when a request names none");
    println!("    OLLAMA_TIMEOUT_MS           Local request deadline (default: 120000)");
    println!("    OLLAMA_NUM_CTX              Context window, omitted when <= 0");
    println!("    OLLAMA_NUM_PREDICT          Output token cap, omitted when <= 0");
    println!("    GEMINI_API_KEY              Enables gemini: models");
    println!("    GEMINI_MODEL, GEMINI_API_BASE, GEMINI_TIMEOUT_MS");
    println!("    RATE_LIMIT_WINDOW_MS        Rate-limit window (default: 60000, <= 0 disables)");
    println!("    RATE_LIMIT_MAX              Requests per window (default: 30, <= 0 disables)");
    println!("    CHAT_RELAY_CONFIG           Extra configuration file to load");
    println!("    RUST_LOG                    Overrides LOG_LEVEL with a tracing filter");
    println!();
    println!("EXAMPLES:");
    println!("    chat-relay                  Start the proxy server");
    println!("    chat-relay doctor           Check configuration");
    println!("    chat-relay config show      Show effective configuration");
}

///
/// Initialize logging: `RUST_LOG` when set, otherwise the configured level.
///
/// # Arguments
///  * `config` - application configuration containing log level settings
fn initialize_logging(config: &Config) {
    let default_level = LevelFilter::from_level(config.server.log_level.to_tracing_level());
    let filter =
        EnvFilter::builder().with_default_directive(default_level.into()).from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

///
/// Bind the listener and serve until shutdown.
///
/// # Arguments
///  * `config` - application configuration
///  * `app` - configured Axum application
///
/// # Returns
///  * `Ok(())` when the server shuts down
///  * `ProxyError::Http` if binding or serving fails
async fn start_server(config: &Config, app: Router) -> Result<()> {
    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await.map_err(|e| {
        ProxyError::Http(format!(
            "Failed to bind to {}: {}\n\n\
             To fix this:\n\
             - Check that nothing else listens on port {} (lsof -i :{})\n\
             - Or choose another port: export PORT=3034\n\n\
             Run 'chat-relay doctor' for more help.",
            address, e, config.server.port, config.server.port
        ))
    })?;

    log_startup_info(config);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|e| ProxyError::Http(format!("Server error: {}", e)))?;

    Ok(())
}

///
/// Log startup information and configuration details.
fn log_startup_info(config: &Config) {
    info!("chat-relay v{} listening on {}:{}", VERSION, config.server.host, config.server.port);
    info!("Local backend: {} (default model '{}')", config.local.host, config.local.default_model);
    if config.cloud_enabled() {
        info!("Cloud backend enabled: gemini:{}", config.cloud.model);
    } else {
        info!("Cloud backend disabled (GEMINI_API_KEY not set)");
    }
    if config.rate_limit.window_ms > 0 && config.rate_limit.max_requests > 0 {
        info!(
            "Rate limit: {} requests per {} ms per client",
            config.rate_limit.max_requests, config.rate_limit.window_ms
        );
    }
}
