mod logging;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use objstore_mcp::{ConnectionManager, ServerConfig, ToolServer, Toolkit};
use rmcp::{transport::stdio, ServiceExt};
use tracing::{info, warn};

const SERVER_NAME: &str = "objstore-mcp";

/// Object storage exposed as MCP tools over stdio.
#[derive(Parser, Debug)]
#[command(name = "objstore-mcp", version, about)]
struct Cli {
    /// Default log filter directive (RUST_LOG overrides)
    #[arg(long, env = "OBJSTORE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit JSON log lines
    #[arg(long, env = "OBJSTORE_LOG_JSON")]
    log_json: bool,

    /// YAML configuration file; environment variables are ignored when set
    #[arg(long, env = "OBJSTORE_CONFIG")]
    config: Option<String>,

    /// Force read-only mode
    #[arg(long)]
    read_only: bool,

    /// Register only these tools (comma separated)
    #[arg(long, value_delimiter = ',')]
    tools: Vec<String>,

    /// Never register these tools (comma separated)
    #[arg(long, value_delimiter = ',')]
    disable_tools: Vec<String>,
}

impl Cli {
    fn apply(&self, config: &mut ServerConfig) {
        if self.read_only {
            config.read_only = true;
        }
        if !self.tools.is_empty() {
            config.enabled_tools = self.tools.clone();
        }
        config.disabled_tools.extend(self.disable_tools.iter().cloned());
    }
}

async fn load_config(cli: &Cli) -> anyhow::Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)
            .await
            .with_context(|| format!("failed to load config file {path}"))?,
        None => ServerConfig::from_env(),
    };
    cli.apply(&mut config);
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&logging::LoggingConfig {
        level: cli.log_level.clone(),
        json: cli.log_json,
    })?;

    let config = load_config(&cli).await?;
    if config.connections.is_empty() {
        warn!("No storage connections configured; every tool call will fail");
    }

    let manager = Arc::new(ConnectionManager::with_default_factory(
        config.connections.clone(),
        config.default_connection.clone(),
    ));
    let toolkit = Toolkit::from_config(&config, Arc::clone(&manager));
    let server = ToolServer::new(SERVER_NAME, env!("CARGO_PKG_VERSION"));
    toolkit
        .register_all(&server)
        .context("failed to register tools")?;

    info!(
        tools = server.len(),
        connections = ?manager.list_connections(),
        default_connection = %manager.default_connection_name(),
        read_only = config.read_only,
        "Serving object storage tools over stdio"
    );

    let service = server.serve(stdio()).await?;
    let reason = service.waiting().await?;
    info!(?reason, "MCP session ended");

    if let Err(err) = manager.close() {
        warn!(error = %err, "Failed to close storage connections");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "objstore-mcp",
            "--read-only",
            "--tools",
            "get_object,list_objects",
            "--disable-tools",
            "list_objects",
        ]);
        let mut config = ServerConfig::default();
        cli.apply(&mut config);

        assert!(config.read_only);
        assert_eq!(config.enabled_tools, vec!["get_object", "list_objects"]);
        assert_eq!(config.disabled_tools, vec!["list_objects"]);
    }
}
