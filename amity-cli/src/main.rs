//! amity CLI - runs and maintains the amity API server
//!
//! - `serve`: start the HTTP API (runs migrations first)
//! - `migrate`: create or update the database schema
//! - `repair`: fix notification read flags and duplicate connection pairs
//! - `config`: create, inspect and validate `~/.amity/config.toml`
//! - `completions`: shell completion scripts

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

mod commands;
mod config;
mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "amity",
    author,
    version,
    about = "Backend for the amity social platform",
    long_about = "Run the amity HTTP API (profiles, connection requests, notifications, \
                  chat and preferences) and maintain its Postgres database."
)]
struct Cli {
    /// Enable debug logging (RUST_LOG still wins when set)
    #[arg(long, global = true)]
    debug: bool,

    /// Export traces over OTLP (needs the `telemetry` feature)
    #[arg(long, global = true)]
    otel: bool,

    /// Config file (default: ~/.amity/config.toml)
    #[arg(long, global = true, env = "AMITY_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve(commands::serve::ServeArgs),
    /// Run database migrations and exit
    Migrate(commands::migrate::MigrateArgs),
    /// Repair notification flags and bidirectional connection pairs
    Repair(commands::repair::RepairArgs),
    /// Manage amity configuration (init, path, show, validate)
    Config(config::ConfigArgs),
    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)] // PowerShell is a proper noun, not a suffix
enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let cli = Cli::parse();

    let tracing_config = tracing_setup::TracingConfig {
        debug: cli.debug,
        otel: cli.otel,
    };
    tracing_setup::init(&tracing_config).ok();

    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Commands::Serve(args) => commands::run_serve(args, config_path).await,
        Commands::Migrate(args) => commands::run_migrate(args, config_path).await,
        Commands::Repair(args) => commands::run_repair(args, config_path).await,
        Commands::Config(args) => config::run_config(args, config_path),
        Commands::Completions(args) => run_completions(args),
    };

    tracing_setup::shutdown_otel();
    result
}

/// `~/.amity/.env` first, then `./.env`; neither has to exist
fn load_dotenv() {
    if let Some(home) = dirs::home_dir() {
        let _ = dotenvy::from_path(home.join(".amity/.env"));
    }
    let _ = dotenvy::dotenv();
}

fn run_completions(args: CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    use clap_complete::{generate, Shell as CompletionShell};
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    let shell = match args.shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    };

    generate(shell, &mut cmd, bin_name, &mut io::stdout());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["amity", "repair", "--dry-run", "--debug"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(cli.command, Commands::Repair(ref a) if a.dry_run));
    }
}
