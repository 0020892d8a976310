//! The `sprawl` node binary.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod config;

use app::App;
use config::{Config, LogFormat, LogConfig, Overrides};

#[derive(Debug, Parser)]
#[command(name = "sprawl", version, about = "Decentralized order book node")]
struct Cli {
    /// Config file path. Defaults to ./config.toml when present.
    #[arg(short, long, env = "SPRAWL_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply(cli.overrides);
    init_logging(&config.log)?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting sprawl");
    let app = App::init(config).await?;
    info!(peer = %app.identity().peer_id(), "node running");

    app.run().await
}

/// `RUST_LOG` wins over the configured level when set.
fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("invalid log level {:?}", config.level))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.format {
        LogFormat::Console => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}
