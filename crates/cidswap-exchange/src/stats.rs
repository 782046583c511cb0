//! Send counters and session statistics.

use cidswap_core::types::{ContentId, Message};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Totals {
    blocks_sent: u64,
    data_sent: u64,
}

/// Aggregate outbound block and byte counts.
///
/// Both totals move together under one lock, so a reader never observes a
/// block count that disagrees with its byte count.
#[derive(Debug, Default)]
pub struct SendCounters {
    totals: Mutex<Totals>,
}

impl SendCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for every block in `message`.
    pub fn record(&self, message: &Message) {
        let blocks = message.blocks().len() as u64;
        let bytes = message.total_bytes();
        let mut totals = self.totals.lock();
        totals.blocks_sent = totals.blocks_sent.saturating_add(blocks);
        totals.data_sent = totals.data_sent.saturating_add(bytes);
    }

    /// `(blocks_sent, data_sent)` read atomically.
    pub fn snapshot(&self) -> (u64, u64) {
        let totals = self.totals.lock();
        (totals.blocks_sent, totals.data_sent)
    }
}

/// Point-in-time view of an exchange session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExchangeStats {
    /// Wanted content ids, in key order.
    pub wantlist: Vec<ContentId>,
    /// Blocks handed to the transport.
    pub blocks_sent: u64,
    /// Payload bytes handed to the transport.
    pub data_sent: u64,
    /// Provider searches currently in flight.
    pub active_queries: usize,
    /// New-block notifications waiting ahead of the provide bridge.
    pub provide_buf_len: usize,
}
