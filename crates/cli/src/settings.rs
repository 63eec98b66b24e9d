//! Operator settings: optional TOML file, then `EMISSIONS_*` environment.

use anyhow::{Context, Result};
use config::{Config, Environment, File as ConfigFile};
use emissions_controller::EmissionsParams;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    /// `pretty` or `json`
    pub log_format: String,
    pub params: EmissionsParams,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            params: EmissionsParams::default(),
        }
    }
}

impl Settings {
    /// Load settings. Nested keys use a double underscore in the environment,
    /// e.g. `EMISSIONS_PARAMS__TOTAL_EPOCHS=52`.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            if !path.exists() {
                anyhow::bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            builder = builder.add_source(ConfigFile::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("EMISSIONS")
                .prefix_separator("_")
                .separator("__"),
        );

        let settings: Settings = builder
            .build()
            .context("failed to assemble configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        settings
            .params
            .validate()
            .context("invalid emissions parameters")?;
        Ok(settings)
    }
}
