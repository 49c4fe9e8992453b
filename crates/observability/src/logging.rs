//! Logging configuration.

use clap::Args;
use eyre::Result;
use tracing_subscriber::EnvFilter;

/// Logging flags shared by every binary.
#[derive(Debug, Args, Clone, Default)]
pub struct LogArgs {
    /// Silence all output except errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbose mode (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Extra filter directives, comma separated
    #[arg(long = "log.filter", value_name = "DIRECTIVE")]
    pub filter: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long = "log.json")]
    pub json: bool,
}

impl LogArgs {
    /// Build the filter for these flags.
    ///
    /// Precedence:
    /// 1. `--quiet` shows errors only
    /// 2. otherwise `RUST_LOG` if set, else a level from the `-v` count
    /// 3. `--log.filter` directives are added on top
    pub fn env_filter(&self) -> EnvFilter {
        if self.quiet {
            return EnvFilter::new("error");
        }

        let base_level = match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base_level));

        if let Some(custom) = &self.filter {
            for directive in custom.split(',').filter(|d| !d.trim().is_empty()) {
                if let Ok(directive) = directive.trim().parse() {
                    filter = filter.add_directive(directive);
                }
            }
        }
        filter
    }
}

/// Install the global subscriber.
pub fn init_logging(args: &LogArgs) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(args.env_filter())
        .with_target(true);

    if args.json {
        builder
            .json()
            .try_init()
            .map_err(|err| eyre::eyre!("failed to install subscriber: {err}"))?;
    } else {
        builder
            .try_init()
            .map_err(|err| eyre::eyre!("failed to install subscriber: {err}"))?;
    }
    Ok(())
}
