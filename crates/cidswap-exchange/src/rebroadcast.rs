//! Periodic re-discovery of unresolved wants.
//!
//! Two timers run for the scheduler's lifetime. The metrics timer reports the
//! want-list size and has no other effect. The rebroadcast timer picks one
//! wanted id uniformly at random and submits it as a fresh discovery request.
//! Picking at random rather than from the head of the list keeps one
//! persistently unresolvable id from starving the rest.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::provider_query::DiscoveryRequest;
use crate::wantlist::WantList;

pub struct RebroadcastScheduler {
    wantlist: Arc<WantList>,
    requests: mpsc::Sender<DiscoveryRequest>,
    rebroadcast_interval: Duration,
    metrics_interval: Duration,
    rng: StdRng,
}

impl RebroadcastScheduler {
    pub fn new(
        wantlist: Arc<WantList>,
        requests: mpsc::Sender<DiscoveryRequest>,
        rebroadcast_interval: Duration,
        metrics_interval: Duration,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            wantlist,
            requests,
            rebroadcast_interval,
            metrics_interval,
            rng,
        }
    }

    /// Choose one wanted id uniformly at random, or `None` if nothing is wanted.
    ///
    /// The request carries the entry's own token, so dropping the want also
    /// aborts the search it triggers.
    pub fn pick(&mut self) -> Option<DiscoveryRequest> {
        let entries = self.wantlist.entries();
        if entries.is_empty() {
            return None;
        }
        let entry = &entries[self.rng.gen_range(0..entries.len())];
        Some(DiscoveryRequest::new(entry.cid, entry.token().clone()))
    }

    /// Run both timers until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        let start = Instant::now();
        let mut metrics = interval_at(start + self.metrics_interval, self.metrics_interval);
        metrics.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut broadcast = interval_at(start + self.rebroadcast_interval, self.rebroadcast_interval);
        broadcast.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?self.rebroadcast_interval, "rebroadcast: started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = metrics.tick() => {
                    let n = self.wantlist.len();
                    if n > 0 {
                        debug!(wants = n, "rebroadcast: keys in wantlist");
                    }
                }
                _ = broadcast.tick() => {
                    let Some(request) = self.pick() else { continue };
                    debug!(cid = %request.cid, "rebroadcast: searching again");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        sent = self.requests.send(request) => {
                            if sent.is_err() {
                                debug!("rebroadcast: provider query manager gone");
                                break;
                            }
                        }
                    }
                }
            }
        }
        debug!("rebroadcast: stopped");
    }
}
