//! Error types for the cidswap exchange engine.
use thiserror::Error;

use crate::types::PeerId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("cancelled")] Cancelled,
    #[error("timeout")] Timeout,
    #[error("peer unreachable: {0}")] Unreachable(PeerId),
    #[error("no route: {0}")] NoRoute(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("cancelled")] Cancelled,
    #[error("timeout")] Timeout,
    #[error("peer disconnected: {0}")] PeerDisconnected(PeerId),
    #[error("message too large: {size} > {max}")] MessageTooLarge { size: usize, max: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")] Zero(&'static str),
}

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error(transparent)] Routing(#[from] RoutingError),
    #[error(transparent)] Network(#[from] NetworkError),
    #[error(transparent)] Config(#[from] ConfigError),
    #[error("exchange session is shutting down")] ShuttingDown,
}
