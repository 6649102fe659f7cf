//! # annal-config
//!
//! Layered configuration loading for annal using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`ANNAL_*` prefix, `__` as separator)
//! 2. Project-level `.annal/config.toml`
//! 3. User-level `~/.config/annal/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `ANNAL_DATABASE__PATH` -> `database.path`,
//! `ANNAL_AUDIT__TABLE_SUFFIX` -> `audit.table_suffix`, etc.
//!
//! # Usage
//!
//! ```no_run
//! use annal_config::AnnalConfig;
//!
//! let config = AnnalConfig::load_with_dotenv().expect("config");
//! config.logging.init_tracing().expect("tracing");
//! println!("shadow suffix: {}", config.audit.table_suffix);
//! ```

mod audit;
mod database;
mod error;
mod logging;

pub use audit::AuditSettings;
pub use database::DatabaseConfig;
pub use error::ConfigError;
pub use logging::LoggingConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AnnalConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub audit: AuditSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AnnalConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy`; use [`Self::load_with_dotenv`] for `.env` support.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if extraction fails or a value is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration after reading `.env` from the workspace root.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if extraction fails or a value is invalid.
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can add providers on top.
    #[must_use]
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(".annal/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed("ANNAL_").split("__"))
    }

    /// Check cross-field constraints figment cannot express.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.audit.validate()
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("annal").join("config.toml"))
    }

    /// Walks up from `CARGO_MANIFEST_DIR` (or the current dir) looking for `.env`.
    fn load_dotenv_from_workspace() {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let mut dir = PathBuf::from(manifest_dir);
            for _ in 0..3 {
                let env_path = dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                    return;
                }
                if !dir.pop() {
                    break;
                }
            }
        }

        let _ = dotenvy::dotenv();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AnnalConfig::default();
        config.validate().unwrap();
        assert_eq!(config.audit.table_suffix, "_audit");
        assert_eq!(config.audit.revision_field, "rev");
        assert_eq!(config.logging.filter, "warn");
    }

    #[test]
    fn figment_builds_without_files() {
        figment::Jail::expect_with(|_jail| {
            let config: AnnalConfig = AnnalConfig::figment().extract()?;
            assert_eq!(config.audit.revision_table, "revisions");
            assert_eq!(config.audit.change_kind_field, "change_kind");
            Ok(())
        });
    }
}
