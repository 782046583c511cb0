//! Exchange engine constants. Durations are expressed in seconds unless noted.

/// Length in bytes of a content identifier digest.
pub const CONTENT_ID_LEN: usize = 32;

/// Length in bytes of a peer identifier.
pub const PEER_ID_LEN: usize = 32;

/// Number of outbound task workers draining the decision engine.
pub const DEFAULT_TASK_WORKER_COUNT: usize = 8;

/// Maximum number of concurrently running announce tasks.
pub const DEFAULT_PROVIDE_WORKER_MAX: usize = 6;

/// Maximum number of providers requested from a single routing search.
pub const DEFAULT_MAX_PROVIDERS_PER_REQUEST: usize = 3;

/// Upper bound on one provider search, including the connection attempts it spawns.
pub const DEFAULT_PROVIDER_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Upper bound on one announce call to the routing layer.
pub const DEFAULT_PROVIDE_TIMEOUT_SECS: u64 = 15;

/// Interval between rebroadcasts of a random unresolved want.
pub const DEFAULT_REBROADCAST_INTERVAL_SECS: u64 = 60;

/// Interval of the diagnostic want-list size report.
pub const DEFAULT_METRICS_INTERVAL_SECS: u64 = 10;

/// Buffer of the discovery request queue feeding the provider query manager.
pub const DEFAULT_FIND_KEYS_BUFFER: usize = 32;

/// Buffer of the new-block queue feeding the provide pipeline.
pub const DEFAULT_NEW_BLOCKS_BUFFER: usize = 2048;

/// Largest outbound message a [`crate::traits::BlockSender`] is expected to accept.
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;
