use std::path::PathBuf;

use anyhow::Context;
use bayeux_router::{init_logging, spawn_sweeper, Broker, Settings};
use clap::Parser;

/// Bayeux channel router.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to a TOML/JSON/YAML settings file.
    #[arg(short, long, env = "BAYEUX_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `sweep_interval_ms`.
    #[arg(long)]
    sweep_interval_ms: Option<u64>,

    /// Overrides `logging.level`.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings =
        Settings::load_from(cli.config.as_deref()).context("failed to load settings")?;
    if let Some(ms) = cli.sweep_interval_ms {
        settings.sweep_interval_ms = ms;
    }
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }
    settings.validate()?;

    let logging = init_logging(settings.logging.clone()).context("failed to init logging")?;

    let broker = Broker::new(settings.broker_config());
    let sweeper = spawn_sweeper(&broker, broker.config().sweep_interval);
    tracing::info!(
        sweep_interval_ms = settings.sweep_interval_ms,
        init_timeout_ms = settings.init_timeout_ms,
        "Broker started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!(stats = ?broker.stats(), "Shutting down");
    broker.shutdown();
    sweeper.abort();
    logging.shutdown();
    Ok(())
}
