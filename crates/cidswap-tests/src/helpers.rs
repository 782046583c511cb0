//! Shared test helpers for scenario and property tests.

use cidswap_core::traits::{BlockSender, ContentRouting, DecisionEngine};
use cidswap_core::types::{Block, ContentId, Envelope, Message, PeerId, PeerInfo};
use cidswap_exchange::testing::{MemoryEngine, MemoryNetwork, MemoryRouting};
use cidswap_exchange::{ExchangeConfig, ExchangeSession};
use std::sync::Arc;
use std::time::Duration;

/// Content id of a text label.
pub fn cid(label: &str) -> ContentId {
    ContentId::of(label.as_bytes())
}

/// Peer identity derived from a text label.
pub fn peer(label: &str) -> PeerId {
    PeerId::derive(label.as_bytes())
}

/// An envelope carrying one block with `payload` to `to`.
pub fn envelope(to: &str, payload: &[u8]) -> Envelope {
    let message: Message = std::iter::once(Block::new(payload.to_vec())).collect();
    Envelope::new(peer(to), message)
}

/// The three in-memory collaborators a session runs against.
pub struct Cluster {
    pub routing: Arc<MemoryRouting>,
    pub engine: Arc<MemoryEngine>,
    pub network: Arc<MemoryNetwork>,
}

impl Default for Cluster {
    fn default() -> Self {
        Self::new()
    }
}

impl Cluster {
    pub fn new() -> Self {
        Self {
            routing: Arc::new(MemoryRouting::new()),
            engine: Arc::new(MemoryEngine::new()),
            network: Arc::new(MemoryNetwork::new()),
        }
    }

    /// Register `provider` for `content`.
    pub fn provide(&self, content: &str, provider: &str) {
        self.routing.add_provider(cid(content), PeerInfo::from(peer(provider)));
    }

    pub fn start(&self, config: ExchangeConfig) -> ExchangeSession {
        ExchangeSession::start(
            config,
            Arc::clone(&self.routing) as Arc<dyn ContentRouting>,
            Arc::clone(&self.engine) as Arc<dyn DecisionEngine>,
            Arc::clone(&self.network) as Arc<dyn BlockSender>,
        )
        .unwrap()
    }
}

/// Poll `done` every few milliseconds, panicking if it stays false for five seconds.
pub async fn eventually(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !done() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition never held: {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
