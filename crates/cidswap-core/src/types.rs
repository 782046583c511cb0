//! Core exchange types: content addresses, peers, blocks, and envelopes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{CONTENT_ID_LEN, PEER_ID_LEN};

/// Content address of a block.
///
/// The BLAKE3 digest of the block payload. Identity key for every set and
/// map in the exchange engine.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ContentId(pub [u8; CONTENT_ID_LEN]);

impl ContentId {
    /// Derive the content address of `data`.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create a ContentId from a raw digest.
    pub fn from_bytes(bytes: [u8; CONTENT_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Return the underlying digest.
    pub fn as_bytes(&self) -> &[u8; CONTENT_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

// Short form keeps span fields and test failures readable.
impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", &hex::encode(self.0)[..12])
    }
}

impl From<[u8; CONTENT_ID_LEN]> for ContentId {
    fn from(bytes: [u8; CONTENT_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for ContentId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Identity of a remote node.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PeerId(pub [u8; PEER_ID_LEN]);

impl PeerId {
    /// Derive a peer identity from a seed, e.g. a public key or a test label.
    pub fn derive(seed: &[u8]) -> Self {
        Self(*blake3::hash(seed).as_bytes())
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; PEER_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({self})")
    }
}

/// A peer together with the addresses it was advertised under.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PeerInfo {
    /// The peer's identity.
    pub id: PeerId,
    /// Dialable addresses, in the routing layer's textual form.
    pub addrs: Vec<String>,
}

impl PeerInfo {
    /// A peer with no known addresses.
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            addrs: Vec::new(),
        }
    }
}

impl From<PeerId> for PeerInfo {
    fn from(id: PeerId) -> Self {
        Self::new(id)
    }
}

/// A content-addressed block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    cid: ContentId,
    data: Bytes,
}

impl Block {
    /// Build a block, deriving its address from `data`.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            cid: ContentId::of(&data),
            data,
        }
    }

    /// Content address of this block.
    pub fn cid(&self) -> ContentId {
        self.cid
    }

    /// Raw payload.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Outbound message contents produced by the decision engine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    blocks: Vec<Block>,
}

impl Message {
    /// An empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block to the message.
    pub fn add_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Blocks carried by this message, in insertion order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Sum of block payload sizes.
    pub fn total_bytes(&self) -> u64 {
        self.blocks.iter().map(|b| b.len() as u64).sum()
    }
}

impl FromIterator<Block> for Message {
    fn from_iter<I: IntoIterator<Item = Block>>(iter: I) -> Self {
        Self {
            blocks: iter.into_iter().collect(),
        }
    }
}

/// A scheduled outbound message bundled with its destination peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Destination peer.
    pub peer: PeerId,
    /// What to send.
    pub message: Message,
}

impl Envelope {
    pub fn new(peer: PeerId, message: Message) -> Self {
        Self { peer, message }
    }
}
