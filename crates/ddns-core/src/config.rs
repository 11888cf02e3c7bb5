//! Configuration types for the update engine
//!
//! The configuration document itself lives in [`crate::document`]; this
//! module holds the agent's own tunables.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::state::{MemoryHistoryStore, SqliteHistoryStore};
use crate::traits::HistoryStore;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Lower bound on the sleep between cycles (in seconds)
    ///
    /// The sleep is the smallest entry interval, but never less than this.
    #[serde(default = "default_min_sleep_secs")]
    pub min_sleep_secs: u64,

    /// Capacity of the internal event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Keep only this many history records, trimming after each cycle
    #[serde(default)]
    pub history_retention: Option<usize>,
}

impl EngineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.min_sleep_secs == 0 {
            return Err(crate::Error::config_invalid("min_sleep_secs must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config_invalid(
                "event_channel_capacity must be > 0",
            ));
        }
        if self.history_retention == Some(0) {
            return Err(crate::Error::config_invalid(
                "history_retention must be > 0 when set",
            ));
        }
        Ok(())
    }

    /// Sleep floor as a duration
    pub fn min_sleep(&self) -> Duration {
        Duration::from_secs(self.min_sleep_secs)
    }

    /// Sleep between cycles for the given smallest entry interval
    ///
    /// `None` (no entries) sleeps for the floor.
    pub fn sleep_interval(&self, min_interval: Option<Duration>) -> Duration {
        min_interval.map_or(self.min_sleep(), |interval| interval.max(self.min_sleep()))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_sleep_secs: default_min_sleep_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            history_retention: None,
        }
    }
}

fn default_min_sleep_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// History store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// SQLite database shared with the dashboard
    Sqlite {
        /// Path to the database file
        path: PathBuf,
    },

    /// In-memory store (not persistent)
    Memory,
}

impl StoreConfig {
    /// Store type name
    pub fn type_name(&self) -> &'static str {
        match self {
            StoreConfig::Sqlite { .. } => "sqlite",
            StoreConfig::Memory => "memory",
        }
    }

    /// Open the configured store
    pub async fn open(&self) -> Result<Arc<dyn HistoryStore>, crate::Error> {
        match self {
            StoreConfig::Sqlite { path } => Ok(Arc::new(SqliteHistoryStore::open(path).await?)),
            StoreConfig::Memory => Ok(Arc::new(MemoryHistoryStore::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_interval_uses_smallest_interval_above_floor() {
        let config = EngineConfig::default();
        let intervals = [5u64, 10, 3].map(|m| Duration::from_secs(m * 60));
        let min = intervals.iter().copied().min();
        assert_eq!(config.sleep_interval(min), Duration::from_secs(180));
    }

    #[test]
    fn test_sleep_interval_never_below_floor() {
        let config = EngineConfig::default();
        assert_eq!(
            config.sleep_interval(Some(Duration::from_secs(10))),
            Duration::from_secs(30)
        );
        assert_eq!(config.sleep_interval(None), Duration::from_secs(30));
    }

    #[test]
    fn test_engine_config_defaults_from_json() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.validate().is_ok());

        let config = EngineConfig {
            event_channel_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_config_tagged() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"type": "sqlite", "path": "/var/lib/ddns-agent/agent.db"}"#)
                .unwrap();
        assert_eq!(config.type_name(), "sqlite");

        let config: StoreConfig = serde_json::from_str(r#"{"type": "memory"}"#).unwrap();
        assert_eq!(config, StoreConfig::Memory);
    }

    #[tokio::test]
    async fn test_store_config_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreConfig::Sqlite {
            path: dir.path().join("agent.db"),
        }
        .open()
        .await
        .unwrap();
        assert!(store.cache().await.unwrap().is_empty());
        assert!(dir.path().join("agent.db").exists());
    }
}
