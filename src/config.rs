//! Configuration file parser for `rssagg.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though they are collected so the binary
//! can warn about each one (usually typos) once logging is set up.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::scheduler::SchedulerConfig;

/// Environment variable that overrides `database_path`.
pub const DATABASE_ENV: &str = "RSSAGG_DATABASE";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A value parsed but is out of range.
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level worker configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file.
    pub database_path: PathBuf,

    /// Seconds between scheduling ticks.
    pub tick_interval_secs: u64,

    /// Maximum number of feeds fetched per tick.
    pub batch_size: u32,

    /// Deadline for a single feed fetch, in seconds.
    pub fetch_timeout_secs: u64,

    /// Largest accepted feed body, in bytes.
    pub max_feed_bytes: usize,

    /// Extra in-tick attempts for transient fetch failures. 0 defers to the next tick.
    pub fetch_retries: u32,

    /// Base delay for retry backoff, doubled on each attempt.
    pub retry_backoff_ms: u64,

    /// User-Agent header sent with every fetch.
    pub user_agent: String,

    /// Log filter used when `RUST_LOG` is not set.
    pub log_level: String,

    /// Accept feed URLs pointing at localhost or private networks.
    pub allow_private_hosts: bool,

    /// Keys present in the file that no field consumed.
    #[serde(skip)]
    pub unknown_keys: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("rssagg.db"),
            tick_interval_secs: 60,
            batch_size: 10,
            fetch_timeout_secs: 30,
            max_feed_bytes: 10 * 1024 * 1024,
            fetch_retries: 0,
            retry_backoff_ms: 1000,
            user_agent: concat!("rssagg/", env!("CARGO_PKG_VERSION")).to_string(),
            log_level: "info".to_string(),
            allow_private_hosts: false,
            unknown_keys: Vec::new(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "database_path",
        "tick_interval_secs",
        "batch_size",
        "fetch_timeout_secs",
        "max_feed_bytes",
        "fetch_retries",
        "retry_backoff_ms",
        "user_agent",
        "log_level",
        "allow_private_hosts",
    ];

    /// Load configuration from a TOML file, then apply environment overrides.
    ///
    /// - Missing or empty file → defaults
    /// - Invalid TOML or wrong types → `Err(ConfigError::Parse)`
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_file(path)?;
        if let Ok(db) = std::env::var(DATABASE_ENV) {
            if !db.trim().is_empty() {
                config.database_path = PathBuf::from(db);
            }
        }
        config.validate()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut config: Config = toml::from_str(&content)?;
        if let Ok(raw) = content.parse::<toml::Table>() {
            config.unknown_keys = raw
                .keys()
                .filter(|key| !Self::KNOWN_KEYS.contains(&key.as_str()))
                .cloned()
                .collect();
        }
        Ok(config)
    }

    /// Report how the config was loaded. Call once a subscriber is installed,
    /// since loading happens before logging is configured.
    pub fn log_loaded(&self, path: &Path) {
        for key in &self.unknown_keys {
            tracing::warn!(key = %key, path = %path.display(), "Unknown key in config file, ignoring");
        }
        tracing::info!(
            path = %path.display(),
            database = %self.database_path.display(),
            "Loaded configuration"
        );
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.tick_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_secs must be at least 1".into(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetch_timeout_secs must be at least 1".into(),
            ));
        }
        if self.max_feed_bytes == 0 {
            return Err(ConfigError::Invalid("max_feed_bytes must be at least 1".into()));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            batch_size: self.batch_size,
            tick_interval: Duration::from_secs(self.tick_interval_secs),
            fetch_timeout: self.fetch_timeout(),
            fetch_retries: self.fetch_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("rssagg_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rssagg.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.tick_interval_secs, 60);
        assert_eq!(config.fetch_timeout_secs, 30);
        assert_eq!(config.fetch_retries, 0);
        assert!(!config.allow_private_hosts);
        assert!(config.user_agent.starts_with("rssagg/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/rssagg_test_nonexistent_config.toml");
        let config = Config::load_file(path).unwrap();
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn test_whitespace_file_returns_default() {
        let (dir, path) = write_config("whitespace", "   \n  \n");
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.tick_interval_secs, 60);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (dir, path) = write_config("partial", "batch_size = 3\nfetch_retries = 2\n");
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.fetch_retries, 2);
        assert_eq!(config.fetch_timeout_secs, 30);
        assert!(config.unknown_keys.is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_scheduler_config_conversion() {
        let (dir, path) = write_config(
            "full",
            r#"
database_path = "/var/lib/rssagg/feeds.db"
tick_interval_secs = 120
batch_size = 25
fetch_timeout_secs = 5
retry_backoff_ms = 250
"#,
        );
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/rssagg/feeds.db"));

        let sched = config.scheduler_config();
        assert_eq!(sched.batch_size, 25);
        assert_eq!(sched.tick_interval, Duration::from_secs(120));
        assert_eq!(sched.fetch_timeout, Duration::from_secs(5));
        assert_eq!(sched.retry_backoff, Duration::from_millis(250));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = write_config("invalid", "this is not [valid toml");
        let err = Config::load_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (dir, path) = write_config("wrongtype", "batch_size = \"ten\"\n");
        assert!(Config::load_file(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted_and_collected() {
        let (dir, path) = write_config(
            "unknown",
            "batch_size = 4\ntheme = \"dark\"\ntick_intervl_secs = 5\n",
        );
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.tick_interval_secs, 60);

        let mut unknown = config.unknown_keys.clone();
        unknown.sort();
        assert_eq!(unknown, vec!["theme".to_string(), "tick_intervl_secs".to_string()]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_zero_values_rejected() {
        let config = Config {
            batch_size: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = Config {
            tick_interval_secs: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = Config {
            fetch_timeout_secs: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        std::fs::remove_dir_all(&dir).ok();
    }
}
