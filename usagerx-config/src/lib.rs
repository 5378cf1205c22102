//! # usagerx Configuration
//!
//! Layered configuration for the usage receiver: built-in defaults, then
//! YAML files, then `USAGERX_*` environment variables, validated as a whole
//! before anything starts.

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod database;
mod dispatch;
mod error;
mod listener;
mod queue;
mod telemetry;
mod validation;

pub use database::{DatabaseConfig, TableConfig};
pub use dispatch::{DeadLetterConfig, DispatchConfig, ShutdownConfig};
pub use error::ConfigError;
pub use listener::ListenerConfig;
pub use queue::QueueConfig;
pub use telemetry::TelemetryConfig;

const BASE_FILE: &str = "config/usagerx.yaml";
const ENV_PREFIX: &str = "USAGERX_";

/// Top-level receiver configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
#[serde(default)]
pub struct ReceiverConfig {
    #[validate(nested)]
    pub listener: ListenerConfig,

    #[validate(nested)]
    pub queue: QueueConfig,

    #[validate(nested)]
    pub database: DatabaseConfig,

    #[validate(nested)]
    pub tables: TableConfig,

    #[validate(nested)]
    pub shutdown: ShutdownConfig,

    #[validate(nested)]
    pub dispatch: DispatchConfig,

    #[validate(nested)]
    pub dead_letter: DeadLetterConfig,

    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl ReceiverConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/usagerx.yaml`, if present
    /// 3. `config/<USAGERX_ENV>.yaml` (default `production`), if present
    /// 4. `USAGERX_*` environment variables, `__` separating sections
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(ReceiverConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        }

        let env = std::env::var("USAGERX_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load defaults overlaid with one YAML file and the environment.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        Self::extract(
            Figment::from(Serialized::defaults(ReceiverConfig::default()))
                .merge(Yaml::file(path))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.listener.read_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue.poll_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.shutdown.grace_period_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.dispatch.retry_backoff_ms)
    }
}
