//! Database migration command

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use amity_server::db::migrations;

use crate::config::load_config;

#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// Database URL (overrides config/environment)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

pub async fn run_migrate(args: MigrateArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let pool = super::connect(&config, args.database_url).await?;

    migrations::run(&pool)
        .await
        .context("Failed to run migrations")?;

    println!("✅ Database schema is up to date");
    Ok(())
}
