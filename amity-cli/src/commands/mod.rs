//! Command implementations for the amity CLI

pub mod migrate;
pub mod repair;
pub mod serve;

pub use migrate::run_migrate;
pub use repair::run_repair;
pub use serve::run_serve;

use anyhow::{Context, Result};
use amity_core::AmityConfig;
use amity_server::db::create_pool_with_options;
use sqlx::PgPool;

/// Connect to the database named by `url`, or by the loaded config
pub(crate) async fn connect(config: &AmityConfig, url: Option<String>) -> Result<PgPool> {
    let database_url = url
        .or_else(|| config.database.url.clone())
        .filter(|u| !u.is_empty())
        .context("DATABASE_URL not set. Set via --database-url, DATABASE_URL env, or database.url in config")?;

    create_pool_with_options(&database_url, config.database.max_connections)
        .await
        .context("Failed to create database pool")
}
