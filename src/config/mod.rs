//! Configuration loading for the fuddle client and the `fuddle-watch` binary.
//!
//! Sources are merged with increasing priority:
//! - Default values as code base
//! - Configuration file named by `CONFIG_PATH`
//! - Environment variables with the `FUDDLE__` prefix
mod retry;
pub use retry::*;

use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::ClientConfig;
use crate::Error;
use crate::Filter;
use crate::Result;

const ENV_PREFIX: &str = "FUDDLE";

/// Top level configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct FuddleConfig {
    /// Registry seed addresses, e.g. `["10.26.104.52:8220"]`
    #[serde(default)]
    pub seeds: Vec<String>,
    /// Session and transport tuning
    #[serde(default)]
    pub client: ClientConfig,
    /// Optional member filter applied by `fuddle-watch`
    #[serde(default)]
    pub filter: Option<Filter>,
}

impl FuddleConfig {
    /// Loads configuration from defaults, `CONFIG_PATH` and `FUDDLE__*`
    /// environment variables without validating it.
    ///
    /// # Example
    /// ```ignore
    /// std::env::set_var("FUDDLE__SEEDS", "10.0.0.1:8220,10.0.0.2:8220");
    /// std::env::set_var("FUDDLE__CLIENT__HEARTBEAT_INTERVAL_IN_MS", "500");
    /// let cfg = FuddleConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        let config: Self = builder.add_source(environment()).build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies overrides from another file. Environment variables still win.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Consumes self and checks every section
    pub fn validate(self) -> Result<Self> {
        if self.seeds.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::Config(config::ConfigError::Message(
                "seed addresses must not be empty".to_string(),
            )));
        }
        self.client.validate()?;
        Ok(self)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("seeds")
}
