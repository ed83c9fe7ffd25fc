// src/config.rs

//! Configuration loading and store construction.
//!
//! Config comes from a TOML file (or an object in S3 for Lambda), falls back
//! to defaults, and is then overridden from the environment.

use std::path::Path;
use std::sync::Arc;

#[cfg(feature = "s3")]
use log::{info, warn};

use crate::error::{AppError, Result};
use crate::models::{Config, StoreBackend, StoreConfig};
#[cfg(feature = "s3")]
use crate::storage::s3::S3Store;
use crate::storage::{DocumentStore, LocalStore};

/// Config loader reading `{prefix}/config.toml` from S3.
#[cfg(feature = "s3")]
pub struct RemoteConfigLoader {
    storage: S3Store,
    prefix: String,
}

#[cfg(feature = "s3")]
impl RemoteConfigLoader {
    pub fn new(storage: S3Store, config_prefix: &str) -> Self {
        Self {
            storage,
            prefix: config_prefix.trim_matches('/').to_string(),
        }
    }

    fn key(&self) -> String {
        if self.prefix.is_empty() {
            "config.toml".to_string()
        } else {
            format!("{}/config.toml", self.prefix)
        }
    }

    /// Fetch and parse the remote config. Fails if the object is missing.
    pub async fn load_config(&self) -> Result<Config> {
        let key = self.key();
        info!("Loading config file from S3: {}", key);

        let bytes = self
            .storage
            .read_bytes_optional(&key)
            .await?
            .ok_or_else(|| AppError::config(format!("Config file not found in S3: {key}")))?;

        let content = String::from_utf8(bytes).map_err(|e| {
            AppError::config(format!("Config file {key} is not valid UTF-8: {e}"))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Remote config with env overrides, or env-overridden defaults.
    pub async fn load_or_default(&self) -> Config {
        let mut config = self.load_config().await.unwrap_or_else(|e| {
            warn!("Remote config unavailable: {}. Using defaults.", e);
            Config::default()
        });
        config.apply_env();
        config
    }
}

/// Load configuration from a TOML file, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = Config::load(path)?;
    config.apply_env();
    Ok(config)
}

/// Defaults with environment overrides, for when no config file is usable.
pub fn env_config() -> Config {
    let mut config = Config::default();
    config.apply_env();
    config
}

/// Open the document store selected by `config`.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    match config.backend {
        StoreBackend::Local => {
            if config.root.trim().is_empty() {
                return Err(AppError::config("store.root is empty"));
            }
            Ok(Arc::new(LocalStore::new(&config.root)))
        }
        #[cfg(feature = "s3")]
        StoreBackend::S3 => Ok(Arc::new(S3Store::from_config(config).await?)),
        #[cfg(not(feature = "s3"))]
        StoreBackend::S3 => Err(AppError::config(
            "S3 backend requested but the `s3` feature is disabled",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_reported() {
        let dir = TempDir::new().unwrap();
        assert!(load_config(&dir.path().join("config.toml")).is_err());

        let config = env_config();
        assert!(config.aggregator.serialize_per_climb);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_values_are_validated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[feed]\nmax_in_flight = 0\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.feed.max_in_flight, 0);
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_open_local_store() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            root: dir.path().to_string_lossy().into_owned(),
            ..StoreConfig::default()
        };

        let store = open_store(&config).await.unwrap();
        let ids = store
            .list_ids(&crate::storage::CollectionPath::climbs())
            .await
            .unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_open_store_rejects_empty_root() {
        let config = StoreConfig {
            root: "  ".into(),
            ..StoreConfig::default()
        };
        assert!(open_store(&config).await.is_err());
    }
}
