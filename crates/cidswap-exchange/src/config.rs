//! Exchange engine configuration.

use cidswap_core::constants::{
    DEFAULT_FIND_KEYS_BUFFER, DEFAULT_MAX_PROVIDERS_PER_REQUEST, DEFAULT_METRICS_INTERVAL_SECS,
    DEFAULT_NEW_BLOCKS_BUFFER, DEFAULT_PROVIDE_TIMEOUT_SECS, DEFAULT_PROVIDE_WORKER_MAX,
    DEFAULT_PROVIDER_REQUEST_TIMEOUT_SECS, DEFAULT_REBROADCAST_INTERVAL_SECS,
    DEFAULT_TASK_WORKER_COUNT,
};
use cidswap_core::error::ConfigError;
use std::time::Duration;

/// Tuning knobs for an [`ExchangeSession`](crate::session::ExchangeSession).
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Number of outbound task workers.
    pub task_worker_count: usize,
    /// Maximum number of concurrent announce tasks.
    pub provide_worker_max: usize,
    /// Provider cap passed to each routing search.
    pub max_providers_per_request: usize,
    /// Bound on a single provider search and its connection attempts.
    pub provider_request_timeout: Duration,
    /// Bound on a single announce call.
    pub provide_timeout: Duration,
    /// Interval between want rebroadcasts.
    pub rebroadcast_interval: Duration,
    /// Interval of the want-list size report.
    pub metrics_interval: Duration,
    /// Capacity of the discovery request queue.
    pub find_keys_buffer: usize,
    /// Capacity of the new-block queue ahead of the provide bridge.
    pub new_blocks_buffer: usize,
    /// Announce locally received blocks to the routing layer.
    pub provide_enabled: bool,
    /// Seed for the rebroadcast selector. `None` seeds from OS entropy.
    pub rng_seed: Option<u64>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            task_worker_count: DEFAULT_TASK_WORKER_COUNT,
            provide_worker_max: DEFAULT_PROVIDE_WORKER_MAX,
            max_providers_per_request: DEFAULT_MAX_PROVIDERS_PER_REQUEST,
            provider_request_timeout: Duration::from_secs(DEFAULT_PROVIDER_REQUEST_TIMEOUT_SECS),
            provide_timeout: Duration::from_secs(DEFAULT_PROVIDE_TIMEOUT_SECS),
            rebroadcast_interval: Duration::from_secs(DEFAULT_REBROADCAST_INTERVAL_SECS),
            metrics_interval: Duration::from_secs(DEFAULT_METRICS_INTERVAL_SECS),
            find_keys_buffer: DEFAULT_FIND_KEYS_BUFFER,
            new_blocks_buffer: DEFAULT_NEW_BLOCKS_BUFFER,
            provide_enabled: true,
            rng_seed: None,
        }
    }
}

impl ExchangeConfig {
    /// Preset for tests and simulations: short timers and a fixed seed.
    pub fn testing() -> Self {
        Self {
            provider_request_timeout: Duration::from_millis(500),
            provide_timeout: Duration::from_millis(500),
            rebroadcast_interval: Duration::from_millis(200),
            metrics_interval: Duration::from_secs(1),
            rng_seed: Some(0),
            ..Self::default()
        }
    }

    /// Preset for constrained hosts: two outbound workers, one announce slot.
    pub fn low_resource() -> Self {
        Self {
            task_worker_count: 2,
            provide_worker_max: 1,
            new_blocks_buffer: 256,
            ..Self::default()
        }
    }

    /// Reject configurations that would stall a component.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("task_worker_count", self.task_worker_count),
            ("provide_worker_max", self.provide_worker_max),
            ("max_providers_per_request", self.max_providers_per_request),
            ("find_keys_buffer", self.find_keys_buffer),
            ("new_blocks_buffer", self.new_blocks_buffer),
        ];
        if let Some((name, _)) = counts.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Zero(*name));
        }

        let durations = [
            ("provider_request_timeout", self.provider_request_timeout),
            ("provide_timeout", self.provide_timeout),
            ("rebroadcast_interval", self.rebroadcast_interval),
            ("metrics_interval", self.metrics_interval),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::Zero(*name));
        }

        Ok(())
    }
}
