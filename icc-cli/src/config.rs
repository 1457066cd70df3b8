//! Config file loading for the CLI.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use icc_store::StoreConfig;
use serde::Deserialize;

/// Layout of `config.toml`.
#[derive(Debug, Default, Deserialize)]
struct CliConfig {
    #[serde(default)]
    store: StoreConfig,
}

/// Default config path (`<config_dir>/icc/config.toml`).
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("icc").join("config.toml"))
}

/// Resolve the store configuration.
///
/// An explicit path must exist. The default path is read only if present.
/// `redis_url` wins over whatever the file says.
pub fn load(path: Option<&Path>, redis_url: Option<String>) -> Result<StoreConfig> {
    let file = match path {
        Some(path) => Some(path.to_path_buf()),
        None => default_path().filter(|p| p.exists()),
    };

    let mut config = match file {
        Some(file) => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read config {}", file.display()))?;
            let parsed: CliConfig = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config {}", file.display()))?;
            parsed.store
        }
        None => StoreConfig::default(),
    };

    if let Some(url) = redis_url {
        config = config.with_url(url);
    }

    config.validate()?;
    Ok(config)
}
