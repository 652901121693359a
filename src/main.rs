use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};
use tracing_subscriber::prelude::*;

use wqdss::cli::{run_with_cli, Cli};
use wqdss::config::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = EngineConfig::from_env()?;
    let log_filter = if config.debug { config.log_filter().to_string() } else { cli.log_level.clone() };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    run_with_cli(cli).await
}
