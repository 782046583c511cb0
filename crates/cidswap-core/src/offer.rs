//! Withdrawable envelope reservations.
//!
//! The decision engine hands work to outbound workers in two steps. A worker
//! first obtains an [`EnvelopeOffer`] from the engine's outbox, then claims it.
//! Between those two steps the engine may change its mind (the peer cancelled
//! its want, or a better envelope superseded it) and withdraw the offer by
//! dropping the matching [`OfferHandle`]. Withdrawal resolves only the one
//! offer it belongs to, so no other waiting worker is affected.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::types::Envelope;

/// The engine withdrew an offer before it was fulfilled.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("envelope offer withdrawn")]
pub struct Withdrawn;

/// Engine side of an offer.
#[derive(Debug)]
pub struct OfferHandle {
    tx: oneshot::Sender<Envelope>,
}

impl OfferHandle {
    /// Resolve the offer with `envelope`.
    ///
    /// Hands the envelope back if the worker holding the offer has already gone away.
    pub fn fulfil(self, envelope: Envelope) -> Result<(), Envelope> {
        self.tx.send(envelope)
    }

    /// Withdraw the offer. Equivalent to dropping the handle.
    pub fn withdraw(self) {}
}

/// Worker side of an offer: resolves to an [`Envelope`] or to [`Withdrawn`].
#[derive(Debug)]
pub struct EnvelopeOffer {
    rx: oneshot::Receiver<Envelope>,
}

impl EnvelopeOffer {
    /// Create a linked handle/offer pair.
    pub fn pair() -> (OfferHandle, EnvelopeOffer) {
        let (tx, rx) = oneshot::channel();
        (OfferHandle { tx }, EnvelopeOffer { rx })
    }

    /// An offer that is already resolved with `envelope`.
    pub fn ready(envelope: Envelope) -> Self {
        let (handle, offer) = Self::pair();
        // The receiver is alive, so this cannot fail.
        let _ = handle.fulfil(envelope);
        offer
    }

    /// Wait for the engine to fulfil or withdraw the offer.
    ///
    /// Cancel-safe: dropping the future abandons the offer.
    pub async fn claim(self) -> Result<Envelope, Withdrawn> {
        self.rx.await.map_err(|_| Withdrawn)
    }
}
