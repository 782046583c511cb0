//! Collaborator interfaces consumed by the exchange engine.
//!
//! The engine owns none of these concerns:
//! - [`ContentRouting`]: provider discovery, announcement, and dialing (the DHT)
//! - [`DecisionEngine`]: which peer gets which blocks, and per-peer ledgers
//! - [`BlockSender`]: putting an envelope on the wire
//!
//! Every call that may block receives a [`CancellationToken`]. Implementations
//! should return promptly once it is cancelled; the engine additionally races
//! each call against the token, so a slow implementation delays only itself.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::{NetworkError, RoutingError};
use crate::offer::EnvelopeOffer;
use crate::types::{ContentId, Envelope, Message, PeerId, PeerInfo};

/// Provider discovery and announcement.
#[async_trait]
pub trait ContentRouting: Send + Sync {
    /// Search for up to `max` providers of `cid`.
    ///
    /// The stream is finite: it ends when the search is exhausted or `cancel`
    /// fires. Peers are yielded as they are discovered.
    fn find_providers(
        &self,
        cancel: CancellationToken,
        cid: ContentId,
        max: usize,
    ) -> BoxStream<'static, PeerInfo>;

    /// Announce that this node holds `cid`.
    async fn provide(&self, cancel: CancellationToken, cid: ContentId) -> Result<(), RoutingError>;

    /// Open a connection to `peer`.
    async fn connect_to(&self, cancel: CancellationToken, peer: &PeerInfo) -> Result<(), RoutingError>;
}

/// The scheduling side of the exchange: decides what to send to whom.
#[async_trait]
pub trait DecisionEngine: Send + Sync {
    /// Wait for the next outbound offer.
    ///
    /// Returns `None` once the engine has shut down. Must be cancel-safe:
    /// a caller dropping the future must not lose an offer.
    async fn next_offer(&self) -> Option<EnvelopeOffer>;

    /// Record that `message` is being sent to `peer`.
    ///
    /// Called exactly once per claimed envelope, before transmission.
    fn message_sent(&self, peer: &PeerId, message: &Message);
}

/// Outbound transport for block messages.
#[async_trait]
pub trait BlockSender: Send + Sync {
    /// Transmit the blocks in `envelope` to its destination peer.
    async fn send_blocks(&self, cancel: CancellationToken, envelope: &Envelope) -> Result<(), NetworkError>;
}
