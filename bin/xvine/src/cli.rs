//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use xvine_observability::LogArgs;

/// X-Vine overlay routing simulator
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// Logging configuration (applies to all subcommands).
    #[command(flatten)]
    pub(crate) logs: LogArgs,

    /// Overlay configuration file (TOML). Defaults apply to missing keys.
    #[arg(long, global = true, value_name = "FILE")]
    pub(crate) config: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Run an in-process network of overlay peers.
    Simulate(SimulateArgs),
    /// Print the effective overlay configuration.
    Config(ConfigArgs),
}

#[derive(Debug, Clone, Args)]
pub(crate) struct SimulateArgs {
    /// Number of peers.
    #[arg(long, default_value_t = 16)]
    pub(crate) peers: usize,

    /// Extra random friendships per peer on top of the friend ring.
    #[arg(long, default_value_t = 2)]
    pub(crate) extra_friends: usize,

    /// Seed for identities, the friend graph and every peer's RNG.
    #[arg(long, default_value_t = 1)]
    pub(crate) seed: u64,

    /// Seconds to let ring maintenance run before issuing requests.
    #[arg(long, default_value_t = 10)]
    pub(crate) settle_secs: u64,

    /// Number of blocks to PUT and then GET.
    #[arg(long, default_value_t = 8)]
    pub(crate) keys: usize,

    /// Override the finger discovery interval, in seconds.
    #[arg(long)]
    pub(crate) find_finger_interval: Option<u64>,

    /// Override the successor verification interval, in seconds.
    #[arg(long)]
    pub(crate) verify_interval: Option<u64>,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct ConfigArgs {
    /// Write the configuration to this file instead of stdout.
    #[arg(long, value_name = "FILE")]
    pub(crate) output: Option<PathBuf>,
}
