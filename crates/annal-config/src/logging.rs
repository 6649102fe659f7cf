//! Log filter configuration and subscriber setup.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

fn default_filter() -> String {
    "warn".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `ANNAL_LOG` is not set.
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl LoggingConfig {
    /// Install a global `fmt` subscriber.
    ///
    /// `ANNAL_LOG` takes precedence over the configured filter.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Tracing` if a global subscriber is already set.
    pub fn init_tracing(&self) -> Result<(), ConfigError> {
        let filter = tracing_subscriber::EnvFilter::try_from_env("ANNAL_LOG")
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&self.filter));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|error| ConfigError::Tracing(error.to_string()))
    }

    /// Like [`Self::init_tracing`] but writes through the test harness capture.
    ///
    /// Safe to call from every test; only the first call installs.
    pub fn init_test_tracing(&self) {
        let filter = tracing_subscriber::EnvFilter::try_from_env("ANNAL_LOG")
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&self.filter));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }
}
