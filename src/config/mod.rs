//! Configuration management for the configuration cache.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation
mod log;
mod store;
mod watch;
pub use log::*;
pub use store::*;
pub use watch::*;


use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Prefix for environment overrides, e.g. `DCONFIG__STORE__REQUEST_TIMEOUT_MS`
pub(crate) const ENV_PREFIX: &str = "DCONFIG";

/// Root settings for the store manager, the raw watcher and the engine
///
/// Sources merge in this order (later wins):
/// 1. Default values from code
/// 2. Configuration file named by `CONFIG_PATH`
/// 3. Environment variables with `DCONFIG__` prefix
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Identity fields attached to every log event
    #[serde(default)]
    pub log: LogConfig,

    /// Remote store request deadlines
    #[serde(default)]
    pub store: StoreConfig,

    /// Watch stream tuning
    #[serde(default)]
    pub watch: WatchConfig,
}

impl Settings {
    /// Loads settings from defaults, `CONFIG_PATH` and the environment.
    ///
    /// Validation is deferred so further overrides can be layered on with
    /// [`with_override_config`](Self::with_override_config). Callers must call
    /// [`validate`](Self::validate) before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("DCONFIG__LOG__SERVICE_NAME", "billing");
    /// let settings = Settings::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Self = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Merges an extra file on top of the current values, then re-applies
    /// the environment so it keeps the highest priority.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let settings: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Validates every section and returns the validated settings.
    pub fn validate(self) -> Result<Self> {
        self.log.validate()?;
        self.store.validate()?;
        self.watch.validate()?;
        Ok(self)
    }
}
