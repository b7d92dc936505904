use std::path::PathBuf;
use std::time::Duration;

use crate::limits::{DEFAULT_COMMIT_ATTEMPTS, MAX_COMMIT_ATTEMPTS};

/// Engine settings. `from_env` reads `ROOMKEEP_*` variables and falls back to
/// the defaults for anything unset or unparsable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    /// WAL appends between compactions.
    pub compact_threshold: u64,
    pub max_commit_attempts: u32,
    pub reconcile_interval: Duration,
    pub metrics_port: Option<u16>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            max_commit_attempts: DEFAULT_COMMIT_ATTEMPTS,
            reconcile_interval: Duration::from_secs(5),
            metrics_port: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).map(|v| v.trim().to_string());
        Self {
            data_dir: parse("ROOMKEEP_DATA_DIR")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            compact_threshold: parse("ROOMKEEP_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
            max_commit_attempts: parse("ROOMKEEP_MAX_COMMIT_ATTEMPTS")
                .and_then(|s| s.parse::<u32>().ok())
                .map(|n| n.clamp(1, MAX_COMMIT_ATTEMPTS))
                .unwrap_or(defaults.max_commit_attempts),
            reconcile_interval: parse("ROOMKEEP_RECONCILE_INTERVAL_MS")
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconcile_interval),
            metrics_port: parse("ROOMKEEP_METRICS_PORT").and_then(|s| s.parse().ok()),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("rooms.wal")
    }
}
