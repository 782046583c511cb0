//! Cross-component test suite for the cidswap exchange engine.
//!
//! The integration tests under `tests/` drive a full [`ExchangeSession`]
//! against the in-memory collaborators and check the properties that only
//! show up once the components run together: discovery deduplication under
//! rebroadcast, announce ordering under a single slot, and exactly-once
//! delivery across a worker pool.
//!
//! [`ExchangeSession`]: cidswap_exchange::ExchangeSession

pub mod helpers;
