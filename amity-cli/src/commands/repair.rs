//! Data repair command
//!
//! Passes over the whole database:
//! 1. notifications whose `status` and `read` flags disagree
//! 2. user pairs holding connection edges in both directions
//! 3. expired or long-revoked sessions

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use amity_server::db::{ConnectionRepo, NotificationRepo, PairRepair, SessionRepo, StatusRepair};

use crate::config::load_config;

#[derive(Parser, Debug)]
pub struct RepairArgs {
    /// Report what would change without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Database URL (overrides config/environment)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

pub async fn run_repair(args: RepairArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let pool = super::connect(&config, args.database_url).await?;

    let notifications = NotificationRepo::new(&pool)
        .fix_status(None, args.dry_run)
        .await
        .context("Failed to repair notification flags")?;

    let connections = ConnectionRepo::new(&pool);
    let pairs = connections
        .bidirectional_pairs()
        .await
        .context("Failed to list connection pairs")?;

    let mut repairs = Vec::with_capacity(pairs.len());
    for (a, b) in pairs {
        let repair = connections
            .repair_pair(a, b, args.dry_run)
            .await
            .with_context(|| format!("Failed to repair connections between {a} and {b}"))?;
        tracing::debug!(user_low = %repair.user_low, user_high = %repair.user_high, applied = repair.applied, "pair checked");
        repairs.push(repair);
    }

    let sessions = SessionRepo::new(&pool)
        .purge_expired(args.dry_run)
        .await
        .context("Failed to purge expired sessions")?;

    if args.json {
        let report = json!({
            "dry_run": args.dry_run,
            "notifications": notifications,
            "connections": repairs,
            "sessions_purged": sessions,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&notifications, &repairs, sessions, args.dry_run);
    }

    Ok(())
}

fn print_report(
    notifications: &StatusRepair,
    repairs: &[PairRepair],
    sessions: u64,
    dry_run: bool,
) {
    let verb = if dry_run { "would fix" } else { "fixed" };

    println!(
        "Notifications: {} {} ({} marked read, {} marked unread)",
        verb,
        notifications.total(),
        notifications.marked_read,
        notifications.marked_unread
    );

    let changed: Vec<&PairRepair> = repairs.iter().filter(|r| !r.plan.is_noop()).collect();
    println!("Connection pairs: {} {} of {} checked", verb, changed.len(), repairs.len());
    for repair in changed {
        println!(
            "  {} <-> {}: keep {}, delete {}{}",
            repair.user_low,
            repair.user_high,
            repair
                .plan
                .keep
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            repair.plan.delete.len(),
            repair
                .plan
                .set_status
                .map(|s| format!(", set {s}"))
                .unwrap_or_default()
        );
    }

    let purge = if dry_run { "would purge" } else { "purged" };
    println!("Sessions: {} {} expired or revoked", purge, sessions);

    if dry_run {
        println!("\nDry run: nothing was written. Re-run without --dry-run to apply.");
    }
}
