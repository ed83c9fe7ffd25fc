//! Application configuration structures.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Document store backend settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Stat aggregation behavior
    #[serde(default)]
    pub aggregator: AggregatorConfig,

    /// Change feed and watcher settings
    #[serde(default)]
    pub feed: FeedConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply overrides from a key lookup (normally the process environment).
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parse<T: FromStr>(key: &str, value: String) -> Option<T> {
            let parsed = value.trim().parse().ok();
            if parsed.is_none() {
                log::warn!("Ignoring invalid {} value: {:?}", key, value);
            }
            parsed
        }

        if let Some(v) = lookup("STATS_ORPHAN_POLICY") {
            if let Some(policy) = parse("STATS_ORPHAN_POLICY", v) {
                self.aggregator.orphan_policy = policy;
            }
        }
        if let Some(v) = lookup("STATS_SERIALIZE_PER_CLIMB") {
            if let Some(flag) = parse("STATS_SERIALIZE_PER_CLIMB", v) {
                self.aggregator.serialize_per_climb = flag;
            }
        }
        if let Some(v) = lookup("POLL_INTERVAL_MS") {
            if let Some(ms) = parse("POLL_INTERVAL_MS", v) {
                self.feed.poll_interval_ms = ms;
            }
        }
        if let Some(v) = lookup("MAX_IN_FLIGHT") {
            if let Some(n) = parse("MAX_IN_FLIGHT", v) {
                self.feed.max_in_flight = n;
            }
        }
        if let Some(bucket) = lookup("S3_BUCKET") {
            self.store.backend = StoreBackend::S3;
            self.store.bucket = bucket;
        }
        if let Some(prefix) = lookup("S3_PREFIX") {
            self.store.prefix = prefix;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        match self.store.backend {
            StoreBackend::Local if self.store.root.trim().is_empty() => {
                return Err(AppError::validation("store.root is empty"));
            }
            StoreBackend::S3 if self.store.bucket.trim().is_empty() => {
                return Err(AppError::validation("store.bucket is empty"));
            }
            _ => {}
        }
        if self.feed.poll_interval_ms == 0 {
            return Err(AppError::validation("feed.poll_interval_ms must be > 0"));
        }
        if self.feed.max_in_flight == 0 {
            return Err(AppError::validation("feed.max_in_flight must be > 0"));
        }
        if self.feed.channel_capacity == 0 {
            return Err(AppError::validation("feed.channel_capacity must be > 0"));
        }
        if self.logging.level.trim().is_empty() {
            return Err(AppError::validation("logging.level is empty"));
        }
        Ok(())
    }
}

/// Which document store backend to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Local,
    S3,
}

/// Document store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Root directory for the local backend
    #[serde(default = "defaults::root")]
    pub root: String,

    /// Bucket for the S3 backend
    #[serde(default = "defaults::bucket")]
    pub bucket: String,

    /// Key prefix for the S3 backend
    #[serde(default = "defaults::prefix")]
    pub prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            root: defaults::root(),
            bucket: defaults::bucket(),
            prefix: defaults::prefix(),
        }
    }
}

/// What to do when the climb owning a written log no longer exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Log a warning and report the event as handled
    #[default]
    Ignore,
    /// Report the event as failed
    Fail,
    /// Delete the orphaned log document
    Purge,
}

impl FromStr for OrphanPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "fail" => Ok(Self::Fail),
            "purge" => Ok(Self::Purge),
            other => Err(AppError::config(format!("unknown orphan policy: {other}"))),
        }
    }
}

impl fmt::Display for OrphanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ignore => "ignore",
            Self::Fail => "fail",
            Self::Purge => "purge",
        })
    }
}

/// Stat aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Serialize recomputations of the same climb within this process
    #[serde(default = "defaults::serialize_per_climb")]
    pub serialize_per_climb: bool,

    #[serde(default)]
    pub orphan_policy: OrphanPolicy,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            serialize_per_climb: defaults::serialize_per_climb(),
            orphan_policy: OrphanPolicy::default(),
        }
    }
}

/// Change feed and polling watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Interval between watcher polls in milliseconds
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_ms: u64,

    /// Maximum events dispatched concurrently
    #[serde(default = "defaults::max_in_flight")]
    pub max_in_flight: usize,

    /// Extra attempts for a failed dispatch
    #[serde(default = "defaults::retry_attempts")]
    pub retry_attempts: u32,

    /// Delay between dispatch attempts in milliseconds
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_ms: u64,

    /// Buffered events between watcher and feed
    #[serde(default = "defaults::channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::poll_interval(),
            max_in_flight: defaults::max_in_flight(),
            retry_attempts: defaults::retry_attempts(),
            retry_delay_ms: defaults::retry_delay(),
            channel_capacity: defaults::channel_capacity(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "defaults::level")]
    pub level: String,
}

impl LoggingConfig {
    /// Filter directives for the log subscriber. `verbose` forces `debug`.
    pub fn filter(&self, verbose: bool) -> &str {
        if verbose { "debug" } else { self.level.trim() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::level(),
        }
    }
}

mod defaults {
    // Store defaults
    pub fn root() -> String {
        "storage".into()
    }
    pub fn bucket() -> String {
        "climb-stats".into()
    }
    pub fn prefix() -> String {
        "boneyard".into()
    }

    // Aggregator defaults
    pub fn serialize_per_climb() -> bool {
        true
    }

    // Feed defaults
    pub fn poll_interval() -> u64 {
        2_000
    }
    pub fn max_in_flight() -> usize {
        8
    }
    pub fn retry_attempts() -> u32 {
        2
    }
    pub fn retry_delay() -> u64 {
        500
    }
    pub fn channel_capacity() -> usize {
        256
    }

    // Logging defaults
    pub fn level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store.backend, StoreBackend::Local);
        assert!(config.aggregator.serialize_per_climb);
        assert_eq!(config.aggregator.orphan_policy, OrphanPolicy::Ignore);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [aggregator]
            orphan_policy = "purge"

            [feed]
            max_in_flight = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.aggregator.orphan_policy, OrphanPolicy::Purge);
        assert!(config.aggregator.serialize_per_climb);
        assert_eq!(config.feed.max_in_flight, 2);
        assert_eq!(config.feed.poll_interval_ms, 2_000);
        assert_eq!(config.store.root, "storage");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = Config::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
    }

    #[test]
    fn test_logging_filter() {
        let config: Config = toml::from_str(
            r#"
            [logging]
            level = "climb_stats=debug,aws_config=warn"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.logging.filter(false),
            "climb_stats=debug,aws_config=warn"
        );
        assert_eq!(config.logging.filter(true), "debug");
        assert_eq!(LoggingConfig::default().filter(false), "info");

        let mut config = Config::default();
        config.apply_overrides(|key| (key == "LOG_LEVEL").then(|| "warn".to_string()));
        assert_eq!(config.logging.filter(false), "warn");

        config.logging.level = "  ".into();
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("STATS_ORPHAN_POLICY", "fail"),
            ("STATS_SERIALIZE_PER_CLIMB", "false"),
            ("MAX_IN_FLIGHT", "not-a-number"),
            ("S3_BUCKET", "gym-data"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.aggregator.orphan_policy, OrphanPolicy::Fail);
        assert!(!config.aggregator.serialize_per_climb);
        assert_eq!(config.feed.max_in_flight, 8);
        assert_eq!(config.store.backend, StoreBackend::S3);
        assert_eq!(config.store.bucket, "gym-data");
        assert_eq!(config.store.prefix, "boneyard");
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.feed.max_in_flight = 0;
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));

        let mut config = Config::default();
        config.store.backend = StoreBackend::S3;
        config.store.bucket = " ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_orphan_policy_from_str() {
        assert_eq!("PURGE".parse::<OrphanPolicy>().unwrap(), OrphanPolicy::Purge);
        assert!("delete".parse::<OrphanPolicy>().is_err());
        assert_eq!(OrphanPolicy::Ignore.to_string(), "ignore");
    }
}
