//! The set of content ids this node wants but does not yet have.

use cidswap_core::types::ContentId;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One wanted content id.
#[derive(Debug, Clone)]
pub struct WantEntry {
    pub cid: ContentId,
    /// Higher is more urgent. Carried for the decision engine; discovery ignores it.
    pub priority: i32,
    cancel: CancellationToken,
}

impl WantEntry {
    /// Token cancelled when this want is removed.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Wanted content ids keyed in [`ContentId`] order.
///
/// The ordering makes snapshots, and therefore seeded rebroadcast selection,
/// reproducible.
#[derive(Debug, Default)]
pub struct WantList {
    entries: RwLock<BTreeMap<ContentId, WantEntry>>,
}

impl WantList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Want `cid` at `priority`, returning the entry's token.
    ///
    /// A new entry's token is a child of `parent`. Wanting an id already on
    /// the list only updates its priority and returns the existing token.
    pub fn add(&self, cid: ContentId, priority: i32, parent: &CancellationToken) -> CancellationToken {
        let mut entries = self.entries.write();
        let entry = entries.entry(cid).or_insert_with(|| {
            debug!(%cid, priority, "wantlist: added");
            WantEntry {
                cid,
                priority,
                cancel: parent.child_token(),
            }
        });
        entry.priority = priority;
        entry.cancel.clone()
    }

    /// Stop wanting `cid`, cancelling any work done on its behalf.
    pub fn remove(&self, cid: &ContentId) -> bool {
        match self.entries.write().remove(cid) {
            Some(entry) => {
                entry.cancel.cancel();
                debug!(%cid, "wantlist: removed");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, cid: &ContentId) -> bool {
        self.entries.read().contains_key(cid)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of every entry, in key order.
    pub fn entries(&self) -> Vec<WantEntry> {
        self.entries.read().values().cloned().collect()
    }

    /// Snapshot of the wanted ids, in key order.
    pub fn keys(&self) -> Vec<ContentId> {
        self.entries.read().keys().copied().collect()
    }

    /// Token of the entry for `cid`, if wanted.
    pub fn token(&self, cid: &ContentId) -> Option<CancellationToken> {
        self.entries.read().get(cid).map(|e| e.cancel.clone())
    }

    /// Remove every entry, cancelling their tokens.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.entries.write());
        for entry in drained.into_values() {
            entry.cancel.cancel();
        }
    }
}
