//! Worker process configuration, loaded via the `config` crate from
//! environment variables.

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct WorkerConfig {
    /// NATS server URL backing the task bus.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Explicit CPU core count; `None` auto-detects from the host.
    #[serde(default)]
    pub cpu: Option<f64>,

    /// Explicit memory ceiling as a unit string (e.g. `"8gb"`); `None`
    /// auto-detects from the host.
    #[serde(default)]
    pub memory: Option<String>,

    /// Explicit storage ceiling as a unit string; `None` auto-detects from
    /// the host.
    #[serde(default)]
    pub storage: Option<String>,

    /// Interval in milliseconds between queue poll attempts when the
    /// previous sweep over every subscribed queue found nothing.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl WorkerConfig {
    /// # Errors
    ///
    /// Returns an error if configuration values are present but invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default().separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    #[must_use]
    pub fn resource_manager_config(&self) -> flowline_resources::ResourceManagerConfig {
        flowline_resources::ResourceManagerConfig {
            cpu: self.cpu,
            memory: self.memory.clone(),
            storage: self.storage.clone(),
            gpus: Vec::new(),
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}
