//! Config command.

use std::path::{Path, PathBuf};

use crate::config::{self, Config};

/// Print the config location and the effective configuration
pub fn cmd_config(effective: &Config, explicit: Option<&Path>, init: bool) -> anyhow::Result<()> {
    let path: Option<PathBuf> = explicit.map(Path::to_path_buf).or_else(config::config_path);

    match path {
        Some(ref path) => println!("Config file: {}", path.display()),
        None => println!("Config file: <no config directory>"),
    }

    if init {
        match path {
            Some(ref path) if path.exists() => {
                println!("Config file already exists, leaving it untouched.");
            }
            Some(ref path) => {
                config::save_to(&Config::default(), path)?;
                println!("Wrote default configuration.");
            }
            None => return Err(config::ConfigError::NoConfigDir.into()),
        }
    }

    println!("\n{}", toml::to_string_pretty(effective)?);
    Ok(())
}
