//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::Settings;
use crate::error::ConfigError;

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with SIGNALBOT__, `__` between sections)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_settings(config_path: Option<&str>) -> Result<Settings, ConfigError> {
    dotenvy::dotenv().ok();

    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        } else {
            tracing::warn!("Config file {} not found, using environment only", path);
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("SIGNALBOT")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;

    Ok(settings)
}
