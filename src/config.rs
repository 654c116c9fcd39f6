use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::history::DEFAULT_CAPACITY;

/// Round-result notify endpoint polled by default.
pub const DEFAULT_UPSTREAM_URL: &str =
    "https://jakpotgwab.geightdors.net/glms/v1/notify/taixiu?platform_id=g8&gid=vgmn_101";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Upstream notify endpoint
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    /// User-Agent header sent with every poll
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Pause between poll cycles (seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Extra pause after a failed cycle (seconds)
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// When set, failed cycles back off exponentially up to this many seconds
    #[serde(default)]
    pub retry_max_delay_secs: Option<u64>,

    /// Number of rounds kept in memory
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Value of the `id` field on every stored round
    #[serde(default = "default_source_tag")]
    pub source_tag: String,

    /// Route serving the history
    #[serde(default = "default_history_path")]
    pub history_path: String,
}

fn default_upstream_url() -> String {
    DEFAULT_UPSTREAM_URL.to_string()
}

fn default_user_agent() -> String {
    "Python-Proxy/1.0".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_history_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_source_tag() -> String {
    "S77SIMON".to_string()
}

fn default_history_path() -> String {
    "/txmd5".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream_url: default_upstream_url(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            retry_delay_secs: default_retry_delay_secs(),
            retry_max_delay_secs: None,
            history_capacity: default_history_capacity(),
            source_tag: default_source_tag(),
            history_path: default_history_path(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate config from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        reqwest::Url::parse(&self.upstream_url).map_err(|e| {
            ConfigError::Invalid(format!("upstream_url {:?}: {}", self.upstream_url, e))
        })?;

        if !self.history_path.starts_with('/') || self.history_path.len() < 2 {
            return Err(ConfigError::Invalid(format!(
                "history_path must be a non-root absolute path, got {:?}",
                self.history_path
            )));
        }
        if self.history_path == "/health" {
            return Err(ConfigError::Invalid(
                "history_path conflicts with /health".to_string(),
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn retry_max_delay(&self) -> Option<Duration> {
        self.retry_max_delay_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.history_capacity, 300);
        assert_eq!(config.history_path, "/txmd5");
        assert_eq!(config.source_tag, "S77SIMON");
        assert!(config.retry_max_delay().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.upstream_url, DEFAULT_UPSTREAM_URL);
        assert_eq!(config.user_agent, "Python-Proxy/1.0");
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = Config::from_toml(
            r#"
            poll_interval_secs = 2
            history_capacity = 50
            retry_max_delay_secs = 60
            source_tag = "EDGE01"
            "#,
        )
        .unwrap();
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.retry_max_delay(), Some(Duration::from_secs(60)));
        assert_eq!(config.source_tag, "EDGE01");
        assert_eq!(config.retry_delay_secs, 5);
    }

    #[test]
    fn test_rejects_bad_history_path() {
        for path in ["txmd5", "/", "/health"] {
            let toml = format!("history_path = {path:?}");
            assert!(
                matches!(Config::from_toml(&toml), Err(ConfigError::Invalid(_))),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_zero_intervals() {
        for toml in ["poll_interval_secs = 0", "request_timeout_secs = 0"] {
            assert!(
                matches!(Config::from_toml(toml), Err(ConfigError::Invalid(_))),
                "{toml} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_bad_upstream_url() {
        let result = Config::from_toml(r#"upstream_url = "not a url""#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let result = Config::from_toml("poll_interval_secs = \"soon\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "history_path = \"/history\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.history_path, "/history");
    }

    #[test]
    fn test_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::from_file(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
