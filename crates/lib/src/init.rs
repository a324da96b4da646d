//! Initialize the configuration directory: create the config file with the bundled defaults
//! (socket, limits, and a small example catalog).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config;

static DEFAULT_CONFIG: &str = include_str!("../config/config.json");

/// Ensure the config file exists; the daemon refuses to start from built-in defaults because
/// they carry no commands.
pub fn require_initialized(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        anyhow::bail!(
            "configuration not initialized; run `cmdrelay init` first (config file not found: {})",
            config_path.display()
        );
    }
    Ok(())
}

/// Create the config directory and write the default config if none exists.
/// An existing file is never overwritten. Returns the config directory.
pub fn init_config(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if config_path.exists() {
        log::debug!("config already exists at {}, skipping", config_path.display());
    } else {
        std::fs::write(config_path, DEFAULT_CONFIG)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}

/// The bundled default config, parsed. Used by `init` callers that want to show the catalog.
pub fn default_config() -> Result<config::Config> {
    config::parse_config(Path::new("config.json"), DEFAULT_CONFIG)
}
