//! Configuration loading and validation for the runtime.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any variable is invalid.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use common::protocol::DEFAULT_BIND_ADDR;
use serde::Deserialize;

/// Validated runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTP server listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Upper bound on concurrently running handler invocations. Invocations
    /// beyond this limit queue until a worker is free.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// OTLP endpoint for span export. Export is disabled when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.into()
}
fn default_max_workers() -> usize {
    512
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_workers: default_max_workers(),
            otel_exporter_otlp_endpoint: None,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Parsed listen address.
    ///
    /// # Errors
    ///
    /// Returns an error if `bind_addr` is not a valid `host:port` socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_addr
            .trim()
            .parse()
            .with_context(|| format!("BIND_ADDR is not a valid socket address: {}", self.bind_addr))
    }

    /// OTLP endpoint, if span export is enabled.
    pub fn otlp_endpoint(&self) -> Option<&str> {
        self.otel_exporter_otlp_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        if self.max_workers == 0 {
            anyhow::bail!("MAX_WORKERS must be > 0");
        }
        if self.log_level.trim().is_empty() {
            anyhow::bail!("LOG_LEVEL must not be empty");
        }
        Ok(())
    }
}
