//! Outbound task workers.
//!
//! A fixed pool of workers drains the decision engine's outbox. Each worker
//! loops over two waits: the outer wait obtains an [`EnvelopeOffer`], the
//! inner wait claims it. An offer withdrawn before it is claimed is skipped.
//! For a claimed envelope the worker, in order:
//!
//! 1. tells the engine the message is being sent, so the peer's ledger
//!    reflects it before transmission completes,
//! 2. hands the envelope to the transport,
//! 3. on success, adds the envelope's blocks and bytes to the session counters.
//!
//! Transmission failures are logged and not retried here; the remote peer
//! will ask again through its own want rebroadcast.

use cidswap_core::offer::EnvelopeOffer;
use cidswap_core::traits::{BlockSender, DecisionEngine};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::stats::SendCounters;

/// Fixed-size pool of outbound workers.
pub struct OutboundTaskPool {
    engine: Arc<dyn DecisionEngine>,
    network: Arc<dyn BlockSender>,
    counters: Arc<SendCounters>,
    workers: usize,
}

impl OutboundTaskPool {
    pub fn new(
        engine: Arc<dyn DecisionEngine>,
        network: Arc<dyn BlockSender>,
        counters: Arc<SendCounters>,
        workers: usize,
    ) -> Self {
        Self {
            engine,
            network,
            counters,
            workers,
        }
    }

    /// Spawn every worker into `tasks`.
    pub fn spawn_into(self, tasks: &mut JoinSet<()>, cancel: &CancellationToken) {
        info!(workers = self.workers, "task_worker: starting pool");
        for id in 0..self.workers {
            let worker = TaskWorker {
                id,
                engine: Arc::clone(&self.engine),
                network: Arc::clone(&self.network),
                counters: Arc::clone(&self.counters),
            };
            tasks.spawn(worker.run(cancel.clone()));
        }
    }
}

struct TaskWorker {
    id: usize,
    engine: Arc<dyn DecisionEngine>,
    network: Arc<dyn BlockSender>,
    counters: Arc<SendCounters>,
}

impl TaskWorker {
    async fn run(self, cancel: CancellationToken) {
        let worker = self.id;
        loop {
            let offer = tokio::select! {
                _ = cancel.cancelled() => break,
                offer = self.engine.next_offer() => match offer {
                    Some(offer) => offer,
                    None => {
                        debug!(worker, "task_worker: outbox closed");
                        break;
                    }
                },
            };
            if !self.process(offer, &cancel).await {
                break;
            }
        }
        debug!(worker, "task_worker: shutting down");
    }

    /// Claim and send one offer. Returns `false` if cancelled while claiming or sending.
    async fn process(&self, offer: EnvelopeOffer, cancel: &CancellationToken) -> bool {
        let worker = self.id;
        let envelope = tokio::select! {
            _ = cancel.cancelled() => return false,
            claimed = offer.claim() => match claimed {
                Ok(envelope) => envelope,
                Err(_) => {
                    trace!(worker, "task_worker: offer withdrawn");
                    return true;
                }
            },
        };

        for block in envelope.message.blocks() {
            trace!(worker, peer = %envelope.peer, cid = %block.cid(), "task_worker: sending block");
        }
        self.engine.message_sent(&envelope.peer, &envelope.message);

        let sent = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(worker, peer = %envelope.peer, "task_worker: send abandoned on shutdown");
                return false;
            }
            sent = self.network.send_blocks(cancel.clone(), &envelope) => sent,
        };
        match sent {
            Ok(()) => self.counters.record(&envelope.message),
            Err(e) => debug!(worker, peer = %envelope.peer, "task_worker: send failed: {e}"),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryEngine, MemoryNetwork};
    use cidswap_core::types::{Block, Envelope, Message, PeerId};
    use std::time::Duration;

    fn envelope(peer: &str, payloads: Vec<Vec<u8>>) -> Envelope {
        Envelope::new(
            PeerId::derive(peer.as_bytes()),
            payloads.into_iter().map(Block::new).collect(),
        )
    }

    fn pool(
        engine: &Arc<MemoryEngine>,
        network: &Arc<MemoryNetwork>,
        counters: &Arc<SendCounters>,
        workers: usize,
    ) -> OutboundTaskPool {
        OutboundTaskPool::new(
            Arc::clone(engine) as Arc<dyn DecisionEngine>,
            Arc::clone(network) as Arc<dyn BlockSender>,
            Arc::clone(counters),
            workers,
        )
    }

    #[tokio::test]
    async fn sends_each_envelope_once() {
        let engine = Arc::new(MemoryEngine::new());
        let network = Arc::new(MemoryNetwork::new());
        let counters = Arc::new(SendCounters::new());
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        pool(&engine, &network, &counters, 4).spawn_into(&mut tasks, &cancel);

        for i in 0..20u8 {
            engine.offer(envelope(&format!("p{i}"), vec![vec![i; 16]]));
        }
        network.wait_for_sends(20).await;

        assert_eq!(network.sent().len(), 20);
        assert_eq!(engine.message_sent_count(), 20);
        cancel.cancel();
        while tasks.join_next().await.is_some() {}
        assert_eq!(counters.snapshot(), (20, 320));
    }

    #[tokio::test]
    async fn message_sent_precedes_transmission() {
        let engine = Arc::new(MemoryEngine::new());
        let network = Arc::new(MemoryNetwork::with_ledger_probe(Arc::clone(&engine)));
        let counters = Arc::new(SendCounters::new());
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        pool(&engine, &network, &counters, 1).spawn_into(&mut tasks, &cancel);

        engine.offer(envelope("p", vec![b"abc".to_vec()]));
        network.wait_for_sends(1).await;
        assert_eq!(network.ledger_counts_at_send(), vec![1]);
        cancel.cancel();
    }

    #[tokio::test]
    async fn withdrawn_offer_is_skipped() {
        let engine = Arc::new(MemoryEngine::new());
        let network = Arc::new(MemoryNetwork::new());
        let counters = Arc::new(SendCounters::new());
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        pool(&engine, &network, &counters, 1).spawn_into(&mut tasks, &cancel);

        let handle = engine.offer_pending();
        handle.withdraw();
        engine.offer(envelope("p", vec![b"after".to_vec()]));
        network.wait_for_sends(1).await;

        assert_eq!(network.sent().len(), 1);
        assert_eq!(engine.message_sent_count(), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn send_failure_is_not_retried() {
        let engine = Arc::new(MemoryEngine::new());
        let network = Arc::new(MemoryNetwork::new());
        network.fail_sends(true);
        let counters = Arc::new(SendCounters::new());
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        pool(&engine, &network, &counters, 2).spawn_into(&mut tasks, &cancel);

        engine.offer(envelope("p", vec![b"x".to_vec()]));
        network.wait_for_attempts(1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(network.attempts(), 1);
        assert_eq!(engine.message_sent_count(), 1);
        assert_eq!(counters.snapshot(), (0, 0));
        cancel.cancel();
    }

    #[tokio::test]
    async fn workers_exit_on_cancel_while_waiting() {
        let engine = Arc::new(MemoryEngine::new());
        let network = Arc::new(MemoryNetwork::new());
        let counters = Arc::new(SendCounters::new());
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        pool(&engine, &network, &counters, 3).spawn_into(&mut tasks, &cancel);

        // One worker blocks on the inner wait, the rest on the outer one.
        let _held = engine.offer_pending();
        tokio::task::yield_now().await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(res) = tasks.join_next().await {
                res.unwrap();
            }
        })
        .await
        .expect("workers did not observe cancellation");
    }

    #[tokio::test]
    async fn workers_exit_when_outbox_closes() {
        let engine = Arc::new(MemoryEngine::new());
        let network = Arc::new(MemoryNetwork::new());
        let counters = Arc::new(SendCounters::new());
        let mut tasks = JoinSet::new();
        pool(&engine, &network, &counters, 2).spawn_into(&mut tasks, &CancellationToken::new());
        engine.close();
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }
    }

    #[tokio::test]
    async fn cancel_interrupts_a_stalled_send() {
        let engine = Arc::new(MemoryEngine::new());
        let network = Arc::new(MemoryNetwork::new());
        network.set_send_delay(Duration::from_secs(3600));
        let counters = Arc::new(SendCounters::new());
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        pool(&engine, &network, &counters, 1).spawn_into(&mut tasks, &cancel);

        engine.offer(envelope("p", vec![b"stuck".to_vec()]));
        network.wait_for_attempts(1).await;
        assert_eq!(engine.message_sent_count(), 1);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(res) = tasks.join_next().await {
                res.unwrap();
            }
        })
        .await
        .expect("worker stayed blocked in the transport");
        assert!(network.sent().is_empty());
        assert_eq!(counters.snapshot(), (0, 0));
    }

    #[tokio::test]
    async fn oversized_message_is_refused_and_not_counted() {
        let engine = Arc::new(MemoryEngine::new());
        let network = Arc::new(MemoryNetwork::new());
        let counters = Arc::new(SendCounters::new());
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        pool(&engine, &network, &counters, 1).spawn_into(&mut tasks, &cancel);

        let max = cidswap_core::constants::MAX_MESSAGE_SIZE;
        engine.offer(envelope("p", vec![vec![0u8; max + 1]]));
        engine.offer(envelope("p", vec![vec![1u8; 8]]));
        network.wait_for_sends(1).await;

        assert_eq!(network.attempts(), 2);
        assert_eq!(network.sent().len(), 1);
        cancel.cancel();
        while tasks.join_next().await.is_some() {}
        assert_eq!(counters.snapshot(), (1, 8));
    }

    #[test]
    fn empty_message_envelope_is_valid() {
        let env = Envelope::new(PeerId::derive(b"p"), Message::new());
        assert!(env.message.blocks().is_empty());
    }
}
