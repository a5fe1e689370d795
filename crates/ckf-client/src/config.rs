//! Client configuration.
//!
//! Supports loading from a TOML file; every field has a sensible default so
//! tests and embedded use can rely on `ClientConfig::default()`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Interval between confirmation status checks once a transaction is known.
const DEFAULT_STATUS_POLL_SECS: u64 = 5;
/// Interval between "has a deposit arrived yet" probes.
const DEFAULT_DETECT_POLL_SECS: u64 = 10;

/// Base URLs for the remote services.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceEndpoints {
    pub deposit_url: String,
    pub order_book_url: String,
    /// Token label → ledger base URL, one per synthetic asset.
    pub token_urls: Vec<(String, String)>,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            deposit_url: "http://localhost:8080/iso".to_string(),
            order_book_url: "http://localhost:8080/dex".to_string(),
            token_urls: vec![
                ("ckBTC".to_string(), "http://localhost:8080/ckbtc".to_string()),
                ("ckETH".to_string(), "http://localhost:8080/cketh".to_string()),
                ("ckUSDC".to_string(), "http://localhost:8080/ckusdc".to_string()),
            ],
        }
    }
}

/// Top-level configuration for the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Seconds between confirmation status checks.
    pub status_poll_secs: u64,
    /// Seconds between deposit detection probes.
    pub detect_poll_secs: u64,
    /// Path of the durable local state file.
    pub storage_path: PathBuf,
    /// Remote service endpoints.
    pub services: ServiceEndpoints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            status_poll_secs: DEFAULT_STATUS_POLL_SECS,
            detect_poll_secs: DEFAULT_DETECT_POLL_SECS,
            storage_path: PathBuf::from("ckf-state.json"),
            services: ServiceEndpoints::default(),
        }
    }
}

impl ClientConfig {
    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: ClientConfig = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.status_poll_secs > 0, "status_poll_secs must be positive");
        anyhow::ensure!(self.detect_poll_secs > 0, "detect_poll_secs must be positive");
        Ok(())
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_secs)
    }

    pub fn detect_poll_interval(&self) -> Duration {
        Duration::from_secs(self.detect_poll_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.status_poll_interval(), Duration::from_secs(5));
        assert_eq!(config.detect_poll_interval(), Duration::from_secs(10));
        assert_eq!(config.services.token_urls.len(), 3);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_partial_toml() {
        let text = r#"
            status_poll_secs = 2

            [services]
            deposit_url = "http://svc/iso"
        "#;
        let config: ClientConfig = toml::from_str(text).unwrap();
        assert_eq!(config.status_poll_secs, 2);
        assert_eq!(config.detect_poll_secs, DEFAULT_DETECT_POLL_SECS);
        assert_eq!(config.services.deposit_url, "http://svc/iso");
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = ClientConfig {
            status_poll_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
