mod config;
mod error;
mod mcp;
mod tools;
mod utils;

use crate::config::Config;
use crate::mcp::handler::UtilsWellServerHandler;
use crate::tools::commands_tool::{spawn_settings_watcher, CommandRegistry};
use anyhow::{Context, Result};
use rust_mcp_schema::{Implementation, InitializeResult, ServerCapabilities, ServerCapabilitiesTools, LATEST_PROTOCOL_VERSION};
use rust_mcp_sdk::mcp_server::server_runtime::create_server;
use rust_mcp_sdk::McpServer;
use rust_mcp_transport::{StdioTransport, TransportOptions};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, fmt::format::FmtSpan, FmtSubscriber};

fn setup_logging(log_level_str: &str) -> Result<()> {
    let level = match log_level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("utils_well={}", level)));

    // stdout carries the protocol.
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_span_events(FmtSpan::CLOSE)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")
}

fn get_server_details() -> InitializeResult {
    InitializeResult {
        server_info: Implementation {
            name: "utils-well".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools { list_changed: None }),
            ..Default::default()
        },
        meta: None,
        instructions: Some(
            "Developer utilities for the app workspace: run configured terminal command shortcuts \
            (`list_commands`, `run_command`), search the cached sources of git dependencies \
            (`search_repos`, then `toggle_folder` / `open_file` on the returned markup) and host the \
            feature creator panel. `run_command` answers with `selection_required` when a root or \
            subfolder must be chosen; call it again with the choice."
                .to_string(),
        ),
        protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::load().context("Failed to load configuration")?);
    setup_logging(&config.log_level)?;

    tracing::info!(version = %env!("CARGO_PKG_VERSION"), "Starting utils-well server");
    tracing::debug!("Loaded configuration: {:?}", config);
    for skipped in &config.skipped_roots {
        tracing::warn!(root = %skipped.entry, reason = %skipped.reason, "Workspace root ignored");
    }
    if config.workspace_roots.is_empty() {
        tracing::warn!("No workspace roots configured; commands and search need one");
    }

    let registry = Arc::new(CommandRegistry::new(config.commands_file.clone()));
    let _settings_watcher = match spawn_settings_watcher(registry.clone()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "Command settings will not be reloaded on change");
            None
        }
    };

    let handler = UtilsWellServerHandler::new(config.clone(), registry);
    let transport = StdioTransport::new(TransportOptions::default())
        .map_err(|e| anyhow::anyhow!("Failed to create StdioTransport: {}", e))?;
    let server = create_server(get_server_details(), transport, handler);
    server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("MCP SDK Error: {:?}", e))?;

    tracing::info!("Server shutdown.");
    Ok(())
}
