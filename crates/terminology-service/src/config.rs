//! Environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use terminology_engine::{CsvConfig, EngineConfig};

/// Default data directory.
pub const DEFAULT_DATA_PATH: &str = "data";

/// Default interval between pre-expansion passes when nothing wakes the worker.
pub const DEFAULT_REFRESH_SECS: u64 = 30;

/// Service configuration read from `TERMINOLOGY_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Directory of terminology resources to load at start-up.
    pub data_path: PathBuf,
    /// Engine settings.
    pub engine: EngineConfig,
    /// CSV settings for custom terminologies.
    pub csv: CsvConfig,
    /// Interval between pre-expansion passes.
    pub refresh_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            engine: EngineConfig::default(),
            csv: CsvConfig::default(),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_SECS),
        }
    }
}

impl ServiceConfig {
    /// Reads the configuration from the process environment.
    ///
    /// - `TERMINOLOGY_DATA_PATH`: data directory
    /// - `TERMINOLOGY_PRE_EXPAND`: `true`/`1` enables pre-expansion
    /// - `TERMINOLOGY_QUEUE_CAPACITY`: deferred queue capacity
    /// - `TERMINOLOGY_MAX_EXPANSION`: live expansion limit
    /// - `TERMINOLOGY_REFRESH_SECS`: worker refresh interval
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|value| value.trim().parse::<u64>().ok());

        Self {
            data_path: lookup("TERMINOLOGY_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path),
            engine: EngineConfig {
                pre_expand_value_sets: lookup("TERMINOLOGY_PRE_EXPAND")
                    .map(|value| parse_flag(&value))
                    .unwrap_or(defaults.engine.pre_expand_value_sets),
                deferred_queue_capacity: parsed("TERMINOLOGY_QUEUE_CAPACITY")
                    .map(|n| n as usize)
                    .unwrap_or(defaults.engine.deferred_queue_capacity),
                max_expansion_size: parsed("TERMINOLOGY_MAX_EXPANSION")
                    .map(|n| n as usize)
                    .unwrap_or(defaults.engine.max_expansion_size),
            },
            csv: defaults.csv,
            refresh_interval: parsed("TERMINOLOGY_REFRESH_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.refresh_interval),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
