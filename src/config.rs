//! Runner configuration
//!
//! Loaded from a JSON file; every field has a default so `{}` is a valid
//! configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::Severity;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "STRESS_CONFIG_READ",
            ConfigError::Parse { .. } => "STRESS_CONFIG_PARSE",
            ConfigError::Invalid(_) => "STRESS_CONFIG_INVALID",
        }
    }
}

/// Settings shared by every query a runner executes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Coordinator host name, written into the SQL annotation
    #[serde(default = "default_coordinator_host")]
    pub coordinator_host: String,

    /// Root for per-value trace logs (`<results_dir>/result_hashes/`). None disables them.
    #[serde(default)]
    pub results_dir: Option<PathBuf>,

    /// Options set on every query before the query's own options
    #[serde(default)]
    pub common_query_options: BTreeMap<String, String>,

    /// Leave memory limiting to the engine's admission control
    #[serde(default)]
    pub test_admission_control: bool,

    /// Always fetch the profile of a successful query and scan it for spilling
    #[serde(default)]
    pub check_if_mem_was_spilled: bool,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: usize,

    #[serde(default = "default_log_level")]
    pub log_level: Severity,
}

fn default_coordinator_host() -> String {
    "localhost".to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_fetch_batch_size() -> usize {
    1024
}

fn default_log_level() -> Severity {
    Severity::Info
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            coordinator_host: default_coordinator_host(),
            results_dir: None,
            common_query_options: BTreeMap::new(),
            test_admission_control: false,
            check_if_mem_was_spilled: false,
            poll_interval_ms: default_poll_interval_ms(),
            fetch_batch_size: default_fetch_batch_size(),
            log_level: default_log_level(),
        }
    }
}

impl RunnerConfig {
    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: RunnerConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        if self.fetch_batch_size == 0 {
            return Err(ConfigError::Invalid("fetch_batch_size must be positive".into()));
        }
        Ok(())
    }

    pub fn with_coordinator(mut self, host: impl Into<String>) -> Self {
        self.coordinator_host = host.into();
        self
    }

    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = Some(dir.into());
        self
    }

    pub fn with_common_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.common_query_options.insert(name.into(), value.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis().max(1) as u64;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Per-run inputs
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub mem_limit_mb: u64,
    /// Execute the query's set-up SQL first
    pub run_set_up: bool,
    /// Wall-clock budget for the whole run. None means no deadline.
    pub timeout: Option<Duration>,
    /// The caller expects the timeout to cancel the query; skip the postmortem profile
    pub should_cancel: bool,
    /// Attach the profile of a completed SELECT even when its digest matches
    pub retain_profile: bool,
}

impl RunOptions {
    pub fn new(mem_limit_mb: u64) -> Self {
        Self {
            mem_limit_mb,
            run_set_up: false,
            timeout: None,
            should_cancel: false,
            retain_profile: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_set_up(mut self) -> Self {
        self.run_set_up = true;
        self
    }

    pub fn expecting_cancel(mut self) -> Self {
        self.should_cancel = true;
        self
    }

    pub fn retaining_profile(mut self) -> Self {
        self.retain_profile = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.fetch_batch_size, 1024);
        assert_eq!(config.log_level, Severity::Info);
        assert!(config.results_dir.is_none());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: RunnerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RunnerConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"coordinator_host":"node-1","common_query_options":{{"MT_DOP":"4"}},"log_level":"debug"}}"#
        )
        .unwrap();

        let config = RunnerConfig::load(file.path()).unwrap();
        assert_eq!(config.coordinator_host, "node-1");
        assert_eq!(config.common_query_options.get("MT_DOP").map(String::as_str), Some("4"));
        assert_eq!(config.log_level, Severity::Debug);
    }

    #[test]
    fn test_load_rejects_zero_batch_size() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"fetch_batch_size":0}}"#).unwrap();

        let err = RunnerConfig::load(file.path()).unwrap_err();
        assert_eq!(err.code(), "STRESS_CONFIG_INVALID");
    }

    #[test]
    fn test_load_missing_file() {
        let err = RunnerConfig::load(Path::new("/nonexistent/stress.json")).unwrap_err();
        assert_eq!(err.code(), "STRESS_CONFIG_READ");
    }
}
