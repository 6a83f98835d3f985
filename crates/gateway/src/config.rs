//! Configuration loading and validation for the gateway.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any variable is present but invalid.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::admission::RateLimitPolicy;
use crate::crypto::BackendPreference;

/// Validated gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Tracing log level (e.g. `"info"`, `"debug"`). `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP endpoint for span export. Spans are only exported when set.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Bucket capacity per client identifier.
    #[serde(default = "default_rate_limit_max_tokens")]
    pub rate_limit_max_tokens: u32,

    /// Seconds for an empty bucket to refill completely.
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_secs: u64,

    /// Idle seconds after which a client's bucket is reclaimed.
    #[serde(default = "default_rate_limit_retention")]
    pub rate_limit_retention_secs: u64,

    /// How often (seconds) the stale-bucket sweep runs.
    #[serde(default = "default_rate_limit_sweep_interval")]
    pub rate_limit_sweep_interval_secs: u64,

    /// `auto` tries the fast crypto backend first; `fallback` skips it.
    #[serde(default)]
    pub crypto_backend: BackendPreference,
}

fn default_listen_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}
fn default_rate_limit_max_tokens() -> u32 {
    250
}
fn default_rate_limit_window() -> u64 {
    60
}
fn default_rate_limit_retention() -> u64 {
    600
}
fn default_rate_limit_sweep_interval() -> u64 {
    300
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// The admission policy described by the `RATE_LIMIT_*` settings.
    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            max_tokens: self.rate_limit_max_tokens,
            window: Duration::from_secs(self.rate_limit_window_secs),
            retention: Duration::from_secs(self.rate_limit_retention_secs),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_sweep_interval_secs)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            anyhow::bail!("LOG_LEVEL must not be empty");
        }
        if let Some(endpoint) = &self.otel_exporter_otlp_endpoint {
            if endpoint.trim().is_empty() {
                anyhow::bail!("OTEL_EXPORTER_OTLP_ENDPOINT must not be blank when set");
            }
        }
        if self.rate_limit_max_tokens == 0 {
            anyhow::bail!("RATE_LIMIT_MAX_TOKENS must be > 0");
        }
        if self.rate_limit_window_secs == 0 {
            anyhow::bail!("RATE_LIMIT_WINDOW_SECS must be > 0");
        }
        if self.rate_limit_retention_secs == 0 {
            anyhow::bail!("RATE_LIMIT_RETENTION_SECS must be > 0");
        }
        if self.rate_limit_sweep_interval_secs == 0 {
            anyhow::bail!("RATE_LIMIT_SWEEP_INTERVAL_SECS must be > 0");
        }
        Ok(())
    }
}
