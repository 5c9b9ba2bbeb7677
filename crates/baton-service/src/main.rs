//! batond - Workflow routing daemon
//!
//! The baton daemon provides:
//! - REST API for workflow definitions, instances, and submissions
//! - Linear chain progression with template-resolved assignees
//! - Pluggable instance storage (in-memory or PostgreSQL)

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod error;
mod server;

use config::DaemonConfig;
use error::DaemonResult;
use server::Server;

/// Baton Daemon CLI
#[derive(Parser)]
#[command(name = "batond")]
#[command(about = "Baton Daemon - Workflow routing service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BATON_CONFIG")]
    config: Option<String>,

    /// Listen address
    #[arg(short, long, env = "BATON_LISTEN_ADDR")]
    listen: Option<String>,

    /// Workflow catalog path
    #[arg(long, env = "BATON_CATALOG_PATH")]
    catalog: Option<String>,

    /// Log level
    #[arg(long, env = "BATON_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "BATON_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| error::DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| error::DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }

    if let Some(catalog) = cli.catalog {
        config.catalog.path = catalog;
    }

    // Print startup banner
    println!(
        r#"
  ____      _     _____  ___   _   _
 | __ )    / \   |_   _|/ _ \ | \ | |
 |  _ \   / _ \    | | | | | ||  \| |
 | |_) | / ___ \   | | | |_| || |\  |
 |____/ /_/   \_\  |_|  \___/ |_| \_|

  Baton - Workflow Routing Daemon
  Version: {}
  Catalog: {}
  Listening: {}
"#,
        env!("CARGO_PKG_VERSION"),
        config.catalog.path,
        config.server.listen_addr
    );

    // Create and run server
    let server = Server::new(config).await?;
    server.run().await
}
