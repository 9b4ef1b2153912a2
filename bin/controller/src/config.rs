//! Controller process configuration, loaded via the `config` crate from
//! environment variables (double-underscore nesting, matching the server's
//! convention).

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ControllerConfig {
    /// NATS server URL backing the task bus, run mutex, and active-runs set.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Postgres connection URL for the run repository. When unset the
    /// controller falls back to an in-process, non-durable repository —
    /// fine for a single dev instance, useless across a restart or a
    /// second controller process.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Seconds between the leader's active-run dispatch ticks.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// TTL in seconds of the leader-election mutex; the holder renews at
    /// half this interval.
    #[serde(default = "default_election_interval_secs")]
    pub election_interval_secs: u64,

    /// Interval in milliseconds between controller-queue poll attempts
    /// when the previous poll found nothing.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_sync_interval_secs() -> u64 {
    flowline_syncplane::DEFAULT_SYNC_INTERVAL.as_secs()
}

fn default_election_interval_secs() -> u64 {
    flowline_syncplane::DEFAULT_SCHEDULER_ELECTION_INTERVAL.as_secs()
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl ControllerConfig {
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default().separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    #[must_use]
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    #[must_use]
    pub fn election_interval(&self) -> Duration {
        Duration::from_secs(self.election_interval_secs)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_sync_plane_constants() {
        assert_eq!(default_sync_interval_secs(), 10);
        assert_eq!(default_election_interval_secs(), 30);
    }
}
