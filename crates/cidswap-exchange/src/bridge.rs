//! Unbounded FIFO hand-off between new-block notifications and the announce pool.
//!
//! The [`ProvideQueueBridge`] reads content ids from its input as fast as they
//! arrive and offers them, one at a time and in arrival order, on a
//! single-slot output. It alternates between two modes:
//!
//! - **idle**: nothing is armed; the output is not polled and the next input
//!   item becomes the armed candidate.
//! - **armed**: the armed candidate is offered on the output while further
//!   input items queue behind it. When the consumer takes the candidate, the
//!   oldest queued item is armed, or the bridge returns to idle.
//!
//! Once the input closes, the bridge keeps offering until the queue is empty,
//! then drops its output sender so the consumer sees the end of the stream.

use cidswap_core::types::ContentId;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub struct ProvideQueueBridge {
    input: mpsc::Receiver<ContentId>,
    output: mpsc::Sender<ContentId>,
}

impl ProvideQueueBridge {
    /// Build a bridge reading from `input`, returning it with the output receiver.
    ///
    /// The output channel has a single slot: at most one candidate sits
    /// between the bridge and its consumer.
    pub fn new(input: mpsc::Receiver<ContentId>) -> (Self, mpsc::Receiver<ContentId>) {
        let (output, keys) = mpsc::channel(1);
        (Self { input, output }, keys)
    }

    /// Run until the input is drained or `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let Self { mut input, output } = self;
        let mut pending: VecDeque<ContentId> = VecDeque::new();
        let mut armed: Option<ContentId> = None;
        let mut input_open = true;

        loop {
            if !input_open && armed.is_none() {
                debug!("provide: bridge input closed and drained");
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(dropped = pending.len() + usize::from(armed.is_some()), "provide: bridge cancelled");
                    break;
                }
                received = input.recv(), if input_open => match received {
                    Some(cid) => {
                        if armed.is_none() {
                            armed = Some(cid);
                        } else {
                            pending.push_back(cid);
                        }
                        trace!(%cid, queued = pending.len(), "provide: bridge accepted");
                    }
                    None => input_open = false,
                },
                permit = output.reserve(), if armed.is_some() => match permit {
                    Ok(permit) => {
                        if let Some(cid) = armed.take() {
                            permit.send(cid);
                        }
                        armed = pending.pop_front();
                    }
                    Err(_) => {
                        debug!("provide: bridge consumer gone");
                        break;
                    }
                },
            }
        }
    }
}
