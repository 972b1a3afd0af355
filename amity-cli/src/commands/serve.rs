//! HTTP server command
//!
//! Loads config, runs migrations, then serves until SIGTERM/Ctrl+C.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use amity_server::db::migrations;
use amity_server::http::{run_server, AppState, ServerConfig};

use crate::config::load_config;

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to (overrides config; default 127.0.0.1:3030)
    #[arg(long, short = 'b')]
    pub bind: Option<SocketAddr>,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// Database URL (overrides config/environment)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Skip running migrations on startup
    #[arg(long)]
    pub no_migrate: bool,
}

/// Run the HTTP server
pub async fn run_serve(args: ServeArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(bind) = args.bind {
        config.server.bind = bind.to_string();
    }
    if args.cors_permissive {
        config.server.cors_permissive = true;
    }

    for problem in config.validate() {
        // Missing secret/URL are fatal below; everything else is advisory
        tracing::warn!("config: {}", problem);
    }

    let pool = super::connect(&config, args.database_url).await?;
    if !args.no_migrate {
        migrations::run(&pool)
            .await
            .context("Failed to run migrations")?;
    }

    let server_config = ServerConfig::from_config(&config).context("Invalid server config")?;
    let state = AppState::from_config(pool, &config).context("Failed to initialize server")?;

    tracing::info!("Starting amity server on {}", server_config.bind_addr);

    // Run server (blocks until shutdown)
    run_server(state, server_config)
        .await
        .context("Server error")?;

    Ok(())
}
