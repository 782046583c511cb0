//! Provider discovery.
//!
//! The [`ProviderQueryManager`] consumes [`DiscoveryRequest`]s and, for each
//! content id not already being searched for, launches a detached search task:
//! ask the routing layer for providers, dial every provider concurrently, and
//! release the content id once all dials have finished.
//!
//! Concurrency is bounded per content id (one search at a time) and per search
//! (a deadline), not globally. Search tasks are not joined at shutdown; each
//! one ends on its own deadline or when its requester's token is cancelled.

use cidswap_core::error::RoutingError;
use cidswap_core::traits::ContentRouting;
use cidswap_core::types::{ContentId, PeerInfo};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::deadline;
use crate::query_set::{ActiveQuery, ActiveQuerySet};

/// A request to search for providers of one content id.
#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    /// What to search for.
    pub cid: ContentId,
    /// The requester's interest. Once cancelled the request is dropped, and
    /// a search already running on its behalf is aborted.
    pub cancel: CancellationToken,
}

impl DiscoveryRequest {
    pub fn new(cid: ContentId, cancel: CancellationToken) -> Self {
        Self { cid, cancel }
    }
}

/// Deduplicating front end to the routing layer's provider search.
pub struct ProviderQueryManager {
    routing: Arc<dyn ContentRouting>,
    active: ActiveQuerySet,
    max_providers: usize,
    timeout: Duration,
}

impl ProviderQueryManager {
    pub fn new(
        routing: Arc<dyn ContentRouting>,
        active: ActiveQuerySet,
        max_providers: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            routing,
            active,
            max_providers,
            timeout,
        }
    }

    /// The set of content ids with a search in flight.
    pub fn active(&self) -> &ActiveQuerySet {
        &self.active
    }

    /// Consume `requests` until `cancel` fires or every sender is dropped.
    pub async fn run(self, mut requests: mpsc::Receiver<DiscoveryRequest>, cancel: CancellationToken) {
        info!("provider_query: started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                request = requests.recv() => match request {
                    Some(request) => {
                        self.handle(request);
                    }
                    None => {
                        debug!("provider_query: request channel closed");
                        break;
                    }
                },
            }
        }
        debug!(in_flight = self.active.len(), "provider_query: stopped");
    }

    /// Admit one request, spawning its search if it is neither stale nor a duplicate.
    ///
    /// Returns the handle of the spawned search task.
    pub fn handle(&self, request: DiscoveryRequest) -> Option<JoinHandle<()>> {
        if request.cancel.is_cancelled() {
            trace!(cid = %request.cid, "provider_query: requester gone, dropping");
            return None;
        }
        let Some(claim) = self.active.try_acquire(request.cid) else {
            debug!(cid = %request.cid, "provider_query: coalesced with in-flight search");
            return None;
        };

        let routing = Arc::clone(&self.routing);
        let max_providers = self.max_providers;
        let timeout = self.timeout;
        Some(tokio::spawn(async move {
            search(routing, claim, request.cancel, max_providers, timeout).await;
        }))
    }
}

/// Find providers for the claimed content id and dial each of them.
///
/// `claim` is held until every dial has finished.
async fn search(
    routing: Arc<dyn ContentRouting>,
    claim: ActiveQuery,
    parent: CancellationToken,
    max_providers: usize,
    timeout: Duration,
) {
    let cid = claim.cid();
    let ctx = deadline::child_with_timeout(&parent, timeout);
    let _release_timer = ctx.clone().drop_guard();

    let mut providers = routing.find_providers(ctx.clone(), cid, max_providers);
    let mut dials = JoinSet::new();
    loop {
        let peer = tokio::select! {
            _ = ctx.cancelled() => break,
            peer = providers.next() => match peer {
                Some(peer) => peer,
                None => break,
            },
        };
        trace!(%cid, peer = %peer.id, "provider_query: provider found");
        dials.spawn(connect(Arc::clone(&routing), ctx.clone(), peer));
    }

    let found = dials.len();
    let mut connected = 0usize;
    while let Some(result) = dials.join_next().await {
        match result {
            Ok(Ok(())) => connected += 1,
            Ok(Err(_)) => {}
            Err(e) => warn!(%cid, "provider_query: dial task failed: {e}"),
        }
    }
    debug!(%cid, found, connected, "provider_query: search finished");
    drop(claim);
}

/// Best-effort dial of one provider. Failures are logged and returned, never raised.
async fn connect(
    routing: Arc<dyn ContentRouting>,
    ctx: CancellationToken,
    peer: PeerInfo,
) -> Result<(), RoutingError> {
    let result = tokio::select! {
        _ = ctx.cancelled() => Err(RoutingError::Cancelled),
        result = routing.connect_to(ctx.clone(), &peer) => result,
    };
    if let Err(e) = &result {
        debug!(peer = %peer.id, "provider_query: failed to connect to provider: {e}");
    }
    result
}
