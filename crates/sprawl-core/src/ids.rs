//! Channel and order identifiers.
//!
//! Both are derived, never chosen by a caller: channel ids from the asset
//! pair, order ids from the creation request and the creator's key.

use prost::Message;
use prost_types::Timestamp;
use std::fmt;

use crate::crypto::Ed25519PublicKey;
use crate::error::CoreError;
use crate::wire::CreateRequest;

/// Separator between the two sorted asset names in a channel id.
pub const ASSET_SEPARATOR: &str = ",";

/// Identifier of a channel (a gossip topic for one asset pair).
///
/// Derived from the sorted asset pair, so `("ETH", "BTC")` and
/// `("BTC", "ETH")` name the same channel. Always valid UTF-8, so the
/// topic name maps back to exactly one id.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(String);

impl ChannelId {
    /// Derive the channel id for an asset pair.
    pub fn derive(asset: &str, counter_asset: &str) -> Self {
        let mut pair = [asset, counter_asset];
        pair.sort_unstable();
        Self(pair.join(ASSET_SEPARATOR))
    }

    /// Parse raw id bytes, as received from the network or storage.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, CoreError> {
        String::from_utf8(bytes.into())
            .map(Self)
            .map_err(|err| CoreError::InvalidChannelId(hex::encode(err.as_bytes())))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The pub/sub topic name for this channel.
    pub fn topic(&self) -> String {
        self.0.clone()
    }
}

impl From<&str> for ChannelId {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<[u8]> for ChannelId {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// A 32-byte order identifier.
///
/// Computed as a Blake3 keyed hash of the encoded creation request and
/// timestamp, keyed by the creator's public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(pub [u8; 32]);

impl OrderId {
    /// Derive the id of an order created from `request` at `created`.
    pub fn derive(
        creator: &Ed25519PublicKey,
        request: &CreateRequest,
        created: &Timestamp,
    ) -> Self {
        let mut data = request.encode_to_vec();
        data.extend_from_slice(&created.encode_to_vec());
        Self(*blake3::keyed_hash(creator.as_bytes(), &data).as_bytes())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrderId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for OrderId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for OrderId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for OrderId {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}
