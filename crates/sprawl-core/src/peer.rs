//! Peer identity.
//!
//! A [`PeerId`] uses the same byte layout as a libp2p peer id for an Ed25519
//! key: an identity multihash over the protobuf-encoded public key. The
//! author's public key is therefore recoverable from the id alone.

use std::fmt;

use crate::crypto::Ed25519PublicKey;
use crate::error::CoreError;

/// Identity multihash header followed by the protobuf `PublicKey` header
/// for a 32-byte Ed25519 key.
const ED25519_PEER_PREFIX: [u8; 6] = [0x00, 0x24, 0x08, 0x01, 0x12, 0x20];

/// The network identity of a peer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(Vec<u8>);

impl PeerId {
    /// Build the peer id for an Ed25519 public key.
    pub fn from_public_key(public_key: &Ed25519PublicKey) -> Self {
        let mut bytes = Vec::with_capacity(ED25519_PEER_PREFIX.len() + 32);
        bytes.extend_from_slice(&ED25519_PEER_PREFIX);
        bytes.extend_from_slice(public_key.as_bytes());
        Self(bytes)
    }

    /// Wrap marshaled peer id bytes.
    ///
    /// Non-Ed25519 ids are accepted; they simply have no recoverable key.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, CoreError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(CoreError::InvalidPeerId("empty".into()));
        }
        Ok(Self(bytes))
    }

    /// Get the marshaled bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Recover the Ed25519 public key embedded in this id.
    pub fn public_key(&self) -> Result<Ed25519PublicKey, CoreError> {
        match self.0.strip_prefix(&ED25519_PEER_PREFIX[..]) {
            Some(key) => Ed25519PublicKey::try_from(key),
            None => Err(CoreError::InvalidPublicKey),
        }
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    fn short(&self) -> String {
        let key = self.0.strip_prefix(&ED25519_PEER_PREFIX[..]).unwrap_or(&self.0);
        let hex = hex::encode(key);
        hex.chars().take(16).collect()
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.short())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

impl AsRef<[u8]> for PeerId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
