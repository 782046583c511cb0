//! Deduplication of in-flight provider searches.
//!
//! A [`ContentId`] is a member of the [`ActiveQuerySet`] while, and only
//! while, a search for it is running. Membership is taken with an atomic
//! check-and-insert that hands back an [`ActiveQuery`] guard; dropping the
//! guard removes the entry, so a search that ends by any path (completion,
//! timeout, cancellation, or a panic in the task) frees the slot for the next
//! request.

use cidswap_core::types::ContentId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

/// Set of content ids with a provider search in flight.
#[derive(Debug, Clone, Default)]
pub struct ActiveQuerySet {
    inner: Arc<Mutex<HashSet<ContentId>>>,
}

impl ActiveQuerySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `cid` for a new search.
    ///
    /// Returns `None` if a search for `cid` is already running.
    pub fn try_acquire(&self, cid: ContentId) -> Option<ActiveQuery> {
        if !self.inner.lock().insert(cid) {
            trace!(%cid, "query_set: search already in flight");
            return None;
        }
        Some(ActiveQuery {
            set: self.clone(),
            cid,
        })
    }

    pub fn contains(&self, cid: &ContentId) -> bool {
        self.inner.lock().contains(cid)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Membership of one content id in an [`ActiveQuerySet`]. Released on drop.
#[derive(Debug)]
pub struct ActiveQuery {
    set: ActiveQuerySet,
    cid: ContentId,
}

impl ActiveQuery {
    pub fn cid(&self) -> ContentId {
        self.cid
    }
}

impl Drop for ActiveQuery {
    fn drop(&mut self) {
        self.set.inner.lock().remove(&self.cid);
        trace!(cid = %self.cid, "query_set: search released");
    }
}
