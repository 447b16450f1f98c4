use std::{sync::Arc, time::Duration};

use postern_common::State;
use serde::Deserialize;

use crate::{
    backends::{FileBackingStore, MemoryBackingStore},
    r#trait::BackingStore,
};

/// Configuration for the spool backing store
///
/// File-backed spool in RON config:
/// ```ron
/// spool: (
///     type: "File",
///     path: "/var/spool/postern",
/// ),
/// ```
///
/// Memory-backed spool with a capacity limit:
/// ```ron
/// spool: (
///     type: "Memory",
///     capacity: 1000,
/// ),
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum SpoolConfig {
    /// File-based spool (production)
    File(FileBackingStore),
    /// Memory-based spool (testing/development)
    Memory(MemoryConfig),
}

/// Configuration for memory-backed spool
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MemoryConfig {
    /// Maximum number of mails to store (omit for unlimited)
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self::File(FileBackingStore::default())
    }
}

impl SpoolConfig {
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File(store) => Some(store.path()),
            Self::Memory(_) => None,
        }
    }

    /// Turn the configuration into a ready-to-use backing store
    ///
    /// File-backed stores are initialised (directory created, orphans removed).
    ///
    /// # Errors
    /// If a file-backed store cannot be initialised
    pub fn into_backing_store(self) -> crate::Result<Arc<dyn BackingStore>> {
        match self {
            Self::File(store) => {
                store.init()?;
                Ok(Arc::new(store))
            }
            Self::Memory(config) => Ok(config.capacity.map_or_else(
                || Arc::new(MemoryBackingStore::new()) as Arc<dyn BackingStore>,
                |capacity| Arc::new(MemoryBackingStore::with_capacity(capacity)),
            )),
        }
    }
}

const fn default_refresh_interval_ms() -> u64 {
    1_000
}

const fn default_max_pending() -> usize {
    1_000
}

const fn default_max_refresh_backoff_ms() -> u64 {
    60_000
}

fn default_error_state() -> String {
    State::ERROR.to_string()
}

/// Tuning for the pending cache of a [`MailQueue`](crate::MailQueue)
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Minimum time between two refreshes of the pending cache
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// Maximum number of records held in the pending cache
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,

    /// Upper bound for the refresh interval after repeated refresh failures
    #[serde(default = "default_max_refresh_backoff_ms")]
    pub max_refresh_backoff_ms: u64,

    /// State whose mail is held back until its retry delay has passed
    #[serde(default = "default_error_state")]
    pub error_state: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            max_pending: default_max_pending(),
            max_refresh_backoff_ms: default_max_refresh_backoff_ms(),
            error_state: default_error_state(),
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Never below the base refresh interval
    #[must_use]
    pub fn max_refresh_backoff(&self) -> Duration {
        Duration::from_millis(self.max_refresh_backoff_ms).max(self.refresh_interval())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_spool_config_variants() {
        let file: SpoolConfig =
            ron::from_str(r#"(type: "File", path: "/var/spool/postern")"#).expect("file config");
        assert_eq!(file.path(), Some(std::path::Path::new("/var/spool/postern")));

        let memory: SpoolConfig =
            ron::from_str(r#"(type: "Memory", capacity: 10)"#).expect("memory config");
        assert!(matches!(
            memory,
            SpoolConfig::Memory(MemoryConfig { capacity: Some(10) })
        ));

        let unlimited: SpoolConfig = ron::from_str(r#"(type: "Memory")"#).expect("memory config");
        assert!(unlimited.path().is_none());
    }

    #[test]
    fn test_queue_config_defaults() {
        let config: QueueConfig = ron::from_str("()").expect("queue config");
        assert_eq!(config.refresh_interval(), Duration::from_secs(1));
        assert_eq!(config.max_pending, 1_000);
        assert_eq!(config.max_refresh_backoff(), Duration::from_secs(60));
        assert_eq!(config.error_state, "error");
    }

    #[test]
    fn test_backoff_never_below_interval() {
        let config = QueueConfig {
            refresh_interval_ms: 5_000,
            max_refresh_backoff_ms: 10,
            ..QueueConfig::default()
        };
        assert_eq!(config.max_refresh_backoff(), Duration::from_secs(5));
    }
}
