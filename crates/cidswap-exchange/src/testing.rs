//! In-memory collaborators for tests, simulations, and benchmarks.
//!
//! Each double records what the engine asked of it and lets the caller inject
//! latency and failures. The `wait_for_*` helpers block until a recorded count
//! is reached and panic after ten seconds, so a broken pipeline fails a test
//! instead of hanging it.

use async_trait::async_trait;
use cidswap_core::constants::MAX_MESSAGE_SIZE;
use cidswap_core::error::{NetworkError, RoutingError};
use cidswap_core::offer::{EnvelopeOffer, OfferHandle};
use cidswap_core::traits::{BlockSender, ContentRouting, DecisionEngine};
use cidswap_core::types::{ContentId, Envelope, Message, PeerId, PeerInfo};
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

const WAIT_LIMIT: Duration = Duration::from_secs(10);

async fn wait_until(notify: &Notify, what: &str, mut done: impl FnMut() -> bool) {
    let wait = async {
        loop {
            let notified = notify.notified();
            if done() {
                return;
            }
            notified.await;
        }
    };
    if tokio::time::timeout(WAIT_LIMIT, wait).await.is_err() {
        panic!("timed out waiting for {what}");
    }
}

/// Decrements a gauge when dropped, including when a call is abandoned mid-flight.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// A routing table held in memory.
#[derive(Default)]
pub struct MemoryRouting {
    providers: Mutex<HashMap<ContentId, Vec<PeerInfo>>>,
    searches: Mutex<HashMap<ContentId, usize>>,
    connected: Mutex<Vec<PeerId>>,
    unreachable: Mutex<HashSet<PeerId>>,
    announced: Mutex<Vec<ContentId>>,
    search_delay: Mutex<Duration>,
    connect_delay: Mutex<Duration>,
    provide_delay: Mutex<Duration>,
    fail_provide: AtomicBool,
    provide_attempts: AtomicUsize,
    provides_in_flight: AtomicUsize,
    peak_provides: AtomicUsize,
    changed: Notify,
}

impl MemoryRouting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise `peer` as a provider of `cid`.
    pub fn add_provider(&self, cid: ContentId, peer: PeerInfo) {
        self.providers.lock().entry(cid).or_default().push(peer);
    }

    /// Make every dial to `peer` fail.
    pub fn fail_connect(&self, peer: PeerId) {
        self.unreachable.lock().insert(peer);
    }

    /// Delay before each provider is yielded by a search.
    pub fn set_search_delay(&self, delay: Duration) {
        *self.search_delay.lock() = delay;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = delay;
    }

    pub fn set_provide_delay(&self, delay: Duration) {
        *self.provide_delay.lock() = delay;
    }

    /// Make every announce fail (after its delay).
    pub fn fail_provide(&self, fail: bool) {
        self.fail_provide.store(fail, Ordering::SeqCst);
    }

    /// Number of provider searches started for `cid`.
    pub fn search_count(&self, cid: &ContentId) -> usize {
        self.searches.lock().get(cid).copied().unwrap_or(0)
    }

    /// Peers successfully dialed, in completion order.
    pub fn connected(&self) -> Vec<PeerId> {
        self.connected.lock().clone()
    }

    /// Content ids successfully announced, in completion order.
    pub fn announced(&self) -> Vec<ContentId> {
        self.announced.lock().clone()
    }

    pub fn provide_attempts(&self) -> usize {
        self.provide_attempts.load(Ordering::SeqCst)
    }

    /// Highest number of announces observed running at the same time.
    pub fn peak_concurrent_provides(&self) -> usize {
        self.peak_provides.load(Ordering::SeqCst)
    }

    pub async fn wait_for_searches(&self, cid: &ContentId, n: usize) {
        wait_until(&self.changed, "provider searches", || self.search_count(cid) >= n).await;
    }

    pub async fn wait_for_connects(&self, n: usize) {
        wait_until(&self.changed, "provider connections", || self.connected.lock().len() >= n).await;
    }

    pub async fn wait_for_announcements(&self, n: usize) {
        wait_until(&self.changed, "announcements", || self.announced.lock().len() >= n).await;
    }

    pub async fn wait_for_provide_attempts(&self, n: usize) {
        wait_until(&self.changed, "announce attempts", || self.provide_attempts() >= n).await;
    }
}

#[async_trait]
impl ContentRouting for MemoryRouting {
    fn find_providers(
        &self,
        cancel: CancellationToken,
        cid: ContentId,
        max: usize,
    ) -> BoxStream<'static, PeerInfo> {
        *self.searches.lock().entry(cid).or_default() += 1;
        self.changed.notify_waiters();

        let peers: Vec<PeerInfo> = self
            .providers
            .lock()
            .get(&cid)
            .map(|p| p.iter().take(max).cloned().collect())
            .unwrap_or_default();
        let delay = *self.search_delay.lock();
        futures::stream::iter(peers)
            .then(move |peer| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                peer
            })
            .take_until(cancel.cancelled_owned())
            .boxed()
    }

    async fn provide(&self, _cancel: CancellationToken, cid: ContentId) -> Result<(), RoutingError> {
        self.provide_attempts.fetch_add(1, Ordering::SeqCst);
        let running = self.provides_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_provides.fetch_max(running, Ordering::SeqCst);
        let in_flight = InFlight(&self.provides_in_flight);

        let delay = *self.provide_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        drop(in_flight);

        let result = if self.fail_provide.load(Ordering::SeqCst) {
            Err(RoutingError::NoRoute(cid.to_string()))
        } else {
            self.announced.lock().push(cid);
            Ok(())
        };
        self.changed.notify_waiters();
        result
    }

    async fn connect_to(&self, _cancel: CancellationToken, peer: &PeerInfo) -> Result<(), RoutingError> {
        let delay = *self.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable.lock().contains(&peer.id) {
            return Err(RoutingError::Unreachable(peer.id));
        }
        self.connected.lock().push(peer.id);
        self.changed.notify_waiters();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Decision engine
// ---------------------------------------------------------------------------

/// A decision engine whose outbox is filled by hand.
pub struct MemoryEngine {
    outbox_tx: Mutex<Option<mpsc::UnboundedSender<EnvelopeOffer>>>,
    outbox_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<EnvelopeOffer>>,
    sent: Mutex<Vec<(PeerId, Message)>>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            outbox_tx: Mutex::new(Some(tx)),
            outbox_rx: tokio::sync::Mutex::new(rx),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Queue an offer that is already fulfilled with `envelope`.
    pub fn offer(&self, envelope: Envelope) {
        self.push(EnvelopeOffer::ready(envelope));
    }

    /// Queue an unresolved offer; the caller fulfils or withdraws it.
    pub fn offer_pending(&self) -> OfferHandle {
        let (handle, offer) = EnvelopeOffer::pair();
        self.push(offer);
        handle
    }

    /// Close the outbox. Workers drain what is queued, then stop.
    pub fn close(&self) {
        self.outbox_tx.lock().take();
    }

    pub fn message_sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Every `message_sent` notification, in call order.
    pub fn ledger(&self) -> Vec<(PeerId, Message)> {
        self.sent.lock().clone()
    }

    fn push(&self, offer: EnvelopeOffer) {
        if let Some(tx) = self.outbox_tx.lock().as_ref() {
            let _ = tx.send(offer);
        }
    }
}

#[async_trait]
impl DecisionEngine for MemoryEngine {
    async fn next_offer(&self) -> Option<EnvelopeOffer> {
        self.outbox_rx.lock().await.recv().await
    }

    fn message_sent(&self, peer: &PeerId, message: &Message) {
        self.sent.lock().push((*peer, message.clone()));
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// A transport that records envelopes instead of sending them.
///
/// Envelopes larger than [`MAX_MESSAGE_SIZE`] are refused.
#[derive(Default)]
pub struct MemoryNetwork {
    sent: Mutex<Vec<Envelope>>,
    attempts: AtomicUsize,
    fail: AtomicBool,
    send_delay: Mutex<Duration>,
    ledger_probe: Option<Arc<MemoryEngine>>,
    ledger_counts: Mutex<Vec<usize>>,
    changed: Notify,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the engine's `message_sent` count at the moment of each send.
    pub fn with_ledger_probe(engine: Arc<MemoryEngine>) -> Self {
        Self {
            ledger_probe: Some(engine),
            ..Self::default()
        }
    }

    /// Make every send fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Delay every send. The delay ignores the cancellation token, like a
    /// transport stuck on a dead connection.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock() = delay;
    }

    /// Envelopes delivered, in completion order.
    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn ledger_counts_at_send(&self) -> Vec<usize> {
        self.ledger_counts.lock().clone()
    }

    pub async fn wait_for_sends(&self, n: usize) {
        wait_until(&self.changed, "sends", || self.sent.lock().len() >= n).await;
    }

    pub async fn wait_for_attempts(&self, n: usize) {
        wait_until(&self.changed, "send attempts", || self.attempts() >= n).await;
    }
}

#[async_trait]
impl BlockSender for MemoryNetwork {
    async fn send_blocks(&self, _cancel: CancellationToken, envelope: &Envelope) -> Result<(), NetworkError> {
        if let Some(engine) = &self.ledger_probe {
            self.ledger_counts.lock().push(engine.message_sent_count());
        }
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.changed.notify_waiters();

        let delay = *self.send_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let size = envelope.message.total_bytes() as usize;
        let result = if size > MAX_MESSAGE_SIZE {
            Err(NetworkError::MessageTooLarge { size, max: MAX_MESSAGE_SIZE })
        } else if self.fail.load(Ordering::SeqCst) {
            Err(NetworkError::PeerDisconnected(envelope.peer))
        } else {
            self.sent.lock().push(envelope.clone());
            Ok(())
        };
        self.changed.notify_waiters();
        result
    }
}
