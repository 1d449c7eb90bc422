//! Configuration for the dispatcher sidecar.
//!
//! Protocol options are shared with the gateway and loaded through
//! [`common::ProtocolConfig::from_env`]; this module only covers routing.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated dispatcher sidecar configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Port the local application sends plaintext requests to.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// `host:port` of the remote solution's gateway. **Required.**
    #[serde(default)]
    pub remote_addr: String,

    /// Solution id of the remote gateway. **Required.**
    #[serde(default)]
    pub target_solution_id: String,

    /// Key-id to encrypt with; falls back to `DEFAULT_KEY_ID`.
    #[serde(default)]
    pub key_id: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_listen_port() -> u16 {
    8088
}
fn default_log_level() -> String {
    "info".into()
}

impl Settings {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build dispatcher configuration from environment")?;

        let s: Settings = cfg
            .try_deserialize()
            .context("failed to deserialise dispatcher configuration")?;

        s.validate()?;
        Ok(s)
    }

    fn validate(&self) -> Result<()> {
        if self.remote_addr.trim().is_empty() {
            anyhow::bail!("REMOTE_ADDR is required and must not be empty");
        }
        if self.target_solution_id.trim().is_empty() {
            anyhow::bail!("TARGET_SOLUTION_ID is required and must not be empty");
        }
        if self.key_id.as_deref().is_some_and(|k| k.trim().is_empty()) {
            anyhow::bail!("KEY_ID must not be blank when set");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            listen_port: default_listen_port(),
            remote_addr: "solution-b:8443".into(),
            target_solution_id: "B".into(),
            key_id: None,
            log_level: default_log_level(),
        }
    }

    #[test]
    fn defaults_are_correct() {
        assert_eq!(default_listen_port(), 8088);
        assert_eq!(default_log_level(), "info");
    }

    #[test]
    fn validate_accepts_valid_settings() {
        assert!(settings().validate().is_ok());
        let pinned = Settings {
            key_id: Some("k2".into()),
            ..settings()
        };
        assert!(pinned.validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_remote() {
        let s = Settings {
            remote_addr: String::new(),
            ..settings()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_target() {
        let s = Settings {
            target_solution_id: " ".into(),
            ..settings()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_key_id() {
        let s = Settings {
            key_id: Some(String::new()),
            ..settings()
        };
        assert!(s.validate().is_err());
    }
}
