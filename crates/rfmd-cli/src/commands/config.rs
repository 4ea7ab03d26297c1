use std::path::Path;

use anyhow::{bail, Result};

use rfmd_core::AppConfig;

/// Write a default config file unless one already exists
pub fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    AppConfig::default().save_to(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Print the effective configuration, overrides included
pub fn show(config: &AppConfig) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
