//! Configuration loading and validation for the gateway sidecar.
//!
//! All values are read from environment variables at startup. Protocol options
//! (keys, header names, lengths, timeout) are loaded separately through
//! [`common::ProtocolConfig::from_env`].

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated gateway sidecar configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Port the gateway listens on for encrypted traffic.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Address of the local application, e.g. `"127.0.0.1:8080"`. **Required.**
    #[serde(default)]
    pub upstream_addr: String,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP endpoint for span export. Logs only when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,
}

fn default_listen_port() -> u16 {
    8443
}
fn default_log_level() -> String {
    "info".into()
}

impl Settings {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build gateway configuration from environment")?;

        let s: Settings = cfg
            .try_deserialize()
            .context("failed to deserialise gateway configuration")?;

        s.validate()?;
        Ok(s)
    }

    fn validate(&self) -> Result<()> {
        if self.upstream_addr.trim().is_empty() {
            anyhow::bail!("UPSTREAM_ADDR is required and must not be empty");
        }
        if self
            .otel_exporter_otlp_endpoint
            .as_deref()
            .is_some_and(|e| e.trim().is_empty())
        {
            anyhow::bail!("OTEL_EXPORTER_OTLP_ENDPOINT must not be blank when set");
        }
        Ok(())
    }
}
