//! Overlay configuration loading.

use std::{fs, path::Path};

use eyre::{Result, WrapErr};
use xvine_overlay::OverlayConfig;

use crate::cli::ConfigArgs;

/// Read `path` if given, otherwise use the defaults.
pub(crate) fn load(path: Option<&Path>) -> Result<OverlayConfig> {
    let Some(path) = path else {
        return Ok(OverlayConfig::default());
    };
    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&content).wrap_err_with(|| format!("invalid config {}", path.display()))
}

pub(crate) fn print(config: OverlayConfig, args: &ConfigArgs) -> Result<()> {
    let content = toml::to_string_pretty(&config)?;
    match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, content)
                .wrap_err_with(|| format!("failed to write config {}", path.display()))?;
        }
        None => print!("{content}"),
    }
    Ok(())
}
