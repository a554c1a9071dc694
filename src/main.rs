use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use legiswatch::config::Config;
use legiswatch::pipeline::TriggerKind;

mod commands;

#[derive(Parser)]
#[command(
    name = "legiswatch",
    version,
    about = "Legislative document monitor with keyword trends and forecasts",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "LEGISWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor as a daemon
    Run,

    /// Run a single trigger now and print the result
    Tick {
        /// Trigger to run
        #[arg(value_enum)]
        kind: TickKind,
    },

    /// Show the committed state and pending outbox entries
    Status,

    /// Retry reports waiting in the outbox
    Resend,

    /// Validate the configuration and show the schedule
    CheckConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum TickKind {
    Fetch,
    Daily,
    Weekly,
}

impl From<TickKind> for TriggerKind {
    fn from(kind: TickKind) -> Self {
        match kind {
            TickKind::Fetch => TriggerKind::Fetch,
            TickKind::Daily => TriggerKind::Daily,
            TickKind::Weekly => TriggerKind::Weekly,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing/logging
    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "legiswatch starting");

    match cli.command {
        Commands::Run => commands::run(config).await?,
        Commands::Tick { kind } => {
            tracing::info!(trigger = %TriggerKind::from(kind), "Starting tick command");
            commands::tick(config, kind.into()).await?;
        }
        Commands::Status => commands::status(config).await?,
        Commands::Resend => commands::resend(config).await?,
        Commands::CheckConfig => commands::check_config(config).await?,
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("legiswatch=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(format!("legiswatch={level},warn")))
            .context("Invalid log level")?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
