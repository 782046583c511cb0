//! # cidswap-exchange — concurrent block-exchange engine.
//!
//! Runs the background machinery of a content-addressed block exchange:
//! provider discovery with per-id deduplication, rate-limited announcement of
//! newly stored blocks, a fixed pool of outbound workers draining the decision
//! engine, and periodic rebroadcast of unresolved wants.
//!
//! The main entry point is [`ExchangeSession::start`], which spawns every
//! component under one root cancellation token. Routing, the decision engine,
//! and the transport are supplied as [`cidswap_core::traits`] objects.

pub mod bridge;
pub mod config;
pub mod deadline;
pub mod provide;
pub mod provider_query;
pub mod query_set;
pub mod rebroadcast;
pub mod session;
pub mod stats;
pub mod task_worker;
pub mod wantlist;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bridge::ProvideQueueBridge;
pub use config::ExchangeConfig;
pub use provide::ProvideWorkerPool;
pub use provider_query::{DiscoveryRequest, ProviderQueryManager};
pub use query_set::{ActiveQuery, ActiveQuerySet};
pub use rebroadcast::RebroadcastScheduler;
pub use session::ExchangeSession;
pub use stats::{ExchangeStats, SendCounters};
pub use task_worker::OutboundTaskPool;
pub use wantlist::{WantEntry, WantList};
