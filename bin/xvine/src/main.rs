//! X-Vine overlay simulator.

mod cli;
mod config;
mod sim;

use clap::Parser;
use color_eyre::eyre;
use tracing::info;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    xvine_observability::init_logging(&cli.logs)?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting xvine");

    let config = config::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Simulate(args) => sim::run(config, args).await?,
        Commands::Config(args) => config::print(config, &args)?,
    }
    Ok(())
}
