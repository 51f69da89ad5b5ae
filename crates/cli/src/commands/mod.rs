//! Subcommand implementations.

pub mod config_cmd;
pub mod models;
pub mod usage;

use std::path::Path;

use steward_config::{AppConfig, ConfigError};

/// Load the default config, or `path` when given. Environment overrides
/// apply either way.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let Some(path) = path else {
        return AppConfig::load();
    };
    let mut config = AppConfig::load_from(path)?;
    config.apply_overrides(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}
