//! Application configuration management.
//!
//! This module handles loading and saving the configuration: where state
//! lives on disk, how to reach the upstream, and how invoice amounts are
//! bumped on collision.
//!
//! Configuration is stored at `~/.config/paywatch/config.json`. Every field
//! has a default, so a missing file (or a partial one) is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::storage::JsonFile;

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "paywatch";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Upstream finance backend.
const DEFAULT_API_BASE_URL: &str = "https://finance.ozon.ru/api/v2/";

/// Web client build tag the backend expects in `ob-client-version`.
const DEFAULT_CLIENT_VERSION: &str = "4e088df2";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Keychain account the PIN is stored under.
const DEFAULT_KEYRING_ACCOUNT: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Overrides the platform data directory.
    pub data_dir: Option<PathBuf>,
    pub api_base_url: String,
    pub client_version: String,
    pub request_timeout_secs: u64,
    /// Increment applied when a requested invoice amount is already taken.
    pub amount_step: Decimal,
    pub keyring_account: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            client_version: DEFAULT_CLIENT_VERSION.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            amount_step: Decimal::new(1, 2),
            keyring_account: DEFAULT_KEYRING_ACCOUNT.to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        Ok(JsonFile::new(path).load()?.unwrap_or_default())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        JsonFile::new(path).save(self)
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the invoice registry and the cookie jar.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = TempDir::new().expect("create temp dir");
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.amount_step, dec!(0.01));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"data_dir": "/tmp/pw", "amount_step": "1.00"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/pw"));
        assert_eq!(config.amount_step, dec!(1));
        assert_eq!(config.client_version, DEFAULT_CLIENT_VERSION);
    }

    #[test]
    fn test_saved_config_loads_back() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("paywatch").join("config.json");

        let config = Config {
            keyring_account: "shop".to_string(),
            amount_step: dec!(0.10),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.keyring_account, "shop");
        assert_eq!(loaded.amount_step, dec!(0.10));
        assert_eq!(loaded.api_base_url, DEFAULT_API_BASE_URL);
    }
}
