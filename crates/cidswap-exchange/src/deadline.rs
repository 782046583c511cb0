//! Bounded-duration child cancellation tokens.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Derive a child of `parent` that is additionally cancelled after `timeout`.
///
/// The timer task exits as soon as the child is cancelled by any path, so
/// callers should cancel the child (or hold its drop guard) once the unit of
/// work finishes.
pub fn child_with_timeout(parent: &CancellationToken, timeout: Duration) -> CancellationToken {
    let child = parent.child_token();
    let timer = child.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = timer.cancelled() => {}
            _ = tokio::time::sleep(timeout) => timer.cancel(),
        }
    });
    child
}
