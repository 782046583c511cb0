//! Rate-limited announcement of locally held content.
//!
//! [`ProvideWorkerPool`] drains the bridge's output and announces each content
//! id to the routing layer, with at most `provide_worker_max` announce tasks
//! running at once. Announcing is advertisement, not durability: failures and
//! timeouts are logged and forgotten.

use cidswap_core::traits::ContentRouting;
use cidswap_core::types::ContentId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::deadline;

pub struct ProvideWorkerPool {
    routing: Arc<dyn ContentRouting>,
    limit: Arc<Semaphore>,
    provide_timeout: Duration,
}

impl ProvideWorkerPool {
    pub fn new(routing: Arc<dyn ContentRouting>, max_workers: usize, provide_timeout: Duration) -> Self {
        Self {
            routing,
            limit: Arc::new(Semaphore::new(max_workers)),
            provide_timeout,
        }
    }

    /// Pull keys until `cancel` fires or the bridge closes its output.
    ///
    /// A key is only taken off `keys` once the previous one has been given a
    /// slot, so a saturated pool pushes back on the bridge rather than
    /// accumulating spawned tasks. In-flight announces are not awaited.
    pub async fn run(self, mut keys: mpsc::Receiver<ContentId>, cancel: CancellationToken) {
        info!(max_workers = self.limit.available_permits(), "provide: worker pool started");
        let mut spawned: u64 = 0;
        loop {
            let cid = tokio::select! {
                _ = cancel.cancelled() => break,
                key = keys.recv() => match key {
                    Some(cid) => cid,
                    None => {
                        debug!("provide: key channel closed");
                        break;
                    }
                },
            };

            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&self.limit).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            spawned += 1;
            let routing = Arc::clone(&self.routing);
            // Announces outlive the pool: only their own deadline stops them.
            let ctx = deadline::child_with_timeout(&CancellationToken::new(), self.provide_timeout);
            tokio::spawn(announce(routing, ctx, cid, spawned, permit));
        }
        debug!(spawned, "provide: worker pool stopped");
    }
}

/// Announce one content id. The permit is released when this returns.
async fn announce(
    routing: Arc<dyn ContentRouting>,
    ctx: CancellationToken,
    cid: ContentId,
    worker: u64,
    _permit: OwnedSemaphorePermit,
) {
    let _release_timer = ctx.clone().drop_guard();
    trace!(%cid, worker, "provide: announcing");
    let result = tokio::select! {
        _ = ctx.cancelled() => {
            debug!(%cid, worker, "provide: announce timed out or cancelled");
            return;
        }
        result = routing.provide(ctx.clone(), cid) => result,
    };
    match result {
        Ok(()) => trace!(%cid, worker, "provide: announced"),
        Err(e) => warn!(%cid, worker, "provide: announce failed: {e}"),
    }
}
