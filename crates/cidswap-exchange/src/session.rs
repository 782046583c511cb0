//! Exchange session: owns the root cancellation token and the component tasks.
//!
//! [`ExchangeSession::start`] wires the components together with queues and
//! spawns them into one supervised [`JoinSet`]:
//!
//! ```text
//! want() ─┬─> WantList ──> RebroadcastScheduler ─┐
//!         └──────────────────────────────────────┴─> ProviderQueryManager ─> routing
//! has_block() ─> ProvideQueueBridge ─> ProvideWorkerPool ─> routing
//! DecisionEngine ─> OutboundTaskPool (P workers) ─> BlockSender
//! ```
//!
//! Cancelling the root token stops every component. Detached work (provider
//! searches and announces) is not joined; it ends on its own deadline.

use cidswap_core::error::ExchangeError;
use cidswap_core::traits::{BlockSender, ContentRouting, DecisionEngine};
use cidswap_core::types::ContentId;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::bridge::ProvideQueueBridge;
use crate::config::ExchangeConfig;
use crate::provide::ProvideWorkerPool;
use crate::provider_query::{DiscoveryRequest, ProviderQueryManager};
use crate::query_set::ActiveQuerySet;
use crate::rebroadcast::RebroadcastScheduler;
use crate::stats::{ExchangeStats, SendCounters};
use crate::task_worker::OutboundTaskPool;
use crate::wantlist::{WantEntry, WantList};

/// A running block-exchange engine.
pub struct ExchangeSession {
    config: ExchangeConfig,
    cancel: CancellationToken,
    wantlist: Arc<WantList>,
    active: ActiveQuerySet,
    counters: Arc<SendCounters>,
    find_keys: mpsc::Sender<DiscoveryRequest>,
    new_blocks: Option<mpsc::Sender<ContentId>>,
    tasks: Mutex<JoinSet<()>>,
}

impl std::fmt::Debug for ExchangeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeSession")
            .field("wants", &self.wantlist.len())
            .field("active_queries", &self.active.len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl ExchangeSession {
    /// Validate `config` and start every component on the current tokio runtime.
    pub fn start(
        config: ExchangeConfig,
        routing: Arc<dyn ContentRouting>,
        engine: Arc<dyn DecisionEngine>,
        network: Arc<dyn BlockSender>,
    ) -> Result<Self, ExchangeError> {
        config.validate()?;

        let cancel = CancellationToken::new();
        let wantlist = Arc::new(WantList::new());
        let active = ActiveQuerySet::new();
        let counters = Arc::new(SendCounters::new());
        let mut tasks = JoinSet::new();

        let (find_keys, find_keys_rx) = mpsc::channel(config.find_keys_buffer);
        let query_manager = ProviderQueryManager::new(
            Arc::clone(&routing),
            active.clone(),
            config.max_providers_per_request,
            config.provider_request_timeout,
        );
        tasks.spawn(query_manager.run(find_keys_rx, cancel.clone()));

        OutboundTaskPool::new(engine, network, Arc::clone(&counters), config.task_worker_count)
            .spawn_into(&mut tasks, &cancel);

        let rebroadcast = RebroadcastScheduler::new(
            Arc::clone(&wantlist),
            find_keys.clone(),
            config.rebroadcast_interval,
            config.metrics_interval,
            config.rng_seed,
        );
        tasks.spawn(rebroadcast.run(cancel.clone()));

        let new_blocks = if config.provide_enabled {
            let (new_blocks, new_blocks_rx) = mpsc::channel(config.new_blocks_buffer);
            let (bridge, provide_keys) = ProvideQueueBridge::new(new_blocks_rx);
            tasks.spawn(bridge.run(cancel.clone()));
            let provide_pool = ProvideWorkerPool::new(
                routing,
                config.provide_worker_max,
                config.provide_timeout,
            );
            tasks.spawn(provide_pool.run(provide_keys, cancel.clone()));
            Some(new_blocks)
        } else {
            debug!("session: provide disabled");
            None
        };

        info!(
            task_workers = config.task_worker_count,
            provide_workers = config.provide_worker_max,
            provide_enabled = config.provide_enabled,
            "session: started"
        );

        Ok(Self {
            config,
            cancel,
            wantlist,
            active,
            counters,
            find_keys,
            new_blocks,
            tasks: Mutex::new(tasks),
        })
    }

    /// Want `cid` at `priority` and start looking for providers.
    pub async fn want(&self, cid: ContentId, priority: i32) -> Result<(), ExchangeError> {
        if self.cancel.is_cancelled() {
            return Err(ExchangeError::ShuttingDown);
        }
        let token = self.wantlist.add(cid, priority, &self.cancel);
        let request = DiscoveryRequest::new(cid, token);
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ExchangeError::ShuttingDown),
            sent = self.find_keys.send(request) => sent.map_err(|_| ExchangeError::ShuttingDown),
        }
    }

    /// Stop wanting `cid`. Aborts any search running on its behalf.
    pub fn cancel_want(&self, cid: &ContentId) -> bool {
        self.wantlist.remove(cid)
    }

    /// A block for `cid` is now held locally.
    ///
    /// Resolves the want if there was one and queues the id for announcement.
    pub async fn has_block(&self, cid: ContentId) -> Result<(), ExchangeError> {
        if self.cancel.is_cancelled() {
            return Err(ExchangeError::ShuttingDown);
        }
        self.wantlist.remove(&cid);
        let Some(new_blocks) = &self.new_blocks else {
            return Ok(());
        };
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ExchangeError::ShuttingDown),
            sent = new_blocks.send(cid) => sent.map_err(|_| ExchangeError::ShuttingDown),
        }
    }

    /// Snapshot of the want-list.
    pub fn wantlist(&self) -> Vec<WantEntry> {
        self.wantlist.entries()
    }

    pub fn stats(&self) -> ExchangeStats {
        let (blocks_sent, data_sent) = self.counters.snapshot();
        let provide_buf_len = self
            .new_blocks
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0);
        ExchangeStats {
            wantlist: self.wantlist.keys(),
            blocks_sent,
            data_sent,
            active_queries: self.active.len(),
            provide_buf_len,
        }
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Whether the root token is still live.
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// The root token. Cancelling it is equivalent to [`shutdown`](Self::shutdown)
    /// without waiting for the components to stop.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the root token and wait for every component task to return.
    pub async fn shutdown(self) {
        info!("session: shutting down");
        self.cancel.cancel();
        self.wantlist.clear();
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("session: component task failed: {e}");
            }
        }
        info!(
            blocks_sent = self.counters.snapshot().0,
            "session: shutdown complete"
        );
    }
}

impl Drop for ExchangeSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
