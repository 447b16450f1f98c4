use std::time::Duration;

use serde::Deserialize;

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

const fn default_retry_delay_secs() -> u64 {
    300 // 5 minutes
}

const fn default_shutdown_grace_secs() -> u64 {
    60
}

const fn default_claim_timeout_ms() -> u64 {
    1000
}

const fn default_park_delay_secs() -> u64 {
    60
}

/// Spool manager settings
///
/// ```ron
/// manager: (
///     workers: 4,
///     retry_delay_secs: 300,
///     shutdown_grace_secs: 60,
///     max_dispatches: Some(64),
/// ),
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManagerConfig {
    /// Number of worker tasks draining the queue
    ///
    /// Default: the number of available CPUs
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How long mail in the error state waits before it may be claimed again
    ///
    /// Default: 300 seconds
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// How long shutdown waits for in-flight mail before abandoning it
    ///
    /// Abandoned mail stays queued and is picked up again on the next start.
    ///
    /// Default: 60 seconds
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// How long a worker blocks waiting for mail before re-checking whether it
    /// should keep running
    #[serde(default = "default_claim_timeout_ms")]
    pub claim_timeout_ms: u64,

    /// How long stalled mail is held back before it is claimed again
    ///
    /// Default: 60 seconds
    #[serde(default = "default_park_delay_secs")]
    pub park_delay_secs: u64,

    /// Optional cap on processor passes per routing
    #[serde(default)]
    pub max_dispatches: Option<usize>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            retry_delay_secs: default_retry_delay_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            claim_timeout_ms: default_claim_timeout_ms(),
            park_delay_secs: default_park_delay_secs(),
            max_dispatches: None,
        }
    }
}

impl ManagerConfig {
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub const fn claim_timeout(&self) -> Duration {
        Duration::from_millis(self.claim_timeout_ms)
    }

    pub const fn park_delay(&self) -> Duration {
        Duration::from_secs(self.park_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_defaults() {
        assert!(ManagerConfig::default().workers >= 1);

        let config: ManagerConfig = ron::from_str("(workers: 2)").expect("config");

        assert_eq!(config.workers, 2);
        assert_eq!(config.retry_delay(), Duration::from_secs(300));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(60));
        assert_eq!(config.claim_timeout(), Duration::from_secs(1));
        assert_eq!(config.park_delay(), Duration::from_secs(60));
        assert_eq!(config.max_dispatches, None);
    }

    #[test]
    fn test_overrides() {
        let config: ManagerConfig =
            ron::from_str("(workers: 3, retry_delay_secs: 5, max_dispatches: Some(16))")
                .expect("config");

        assert_eq!(config.workers, 3);
        assert_eq!(config.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.max_dispatches, Some(16));
    }
}
