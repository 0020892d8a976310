//! Wire schema for all peer-to-peer traffic.
//!
//! Field numbers are part of the network protocol: peers running different
//! builds must agree on them, so existing tags are never renumbered.

use prost::Message;
use prost_types::Timestamp;

use crate::error::CoreError;
use crate::ids::ChannelId;
use crate::peer::PeerId;

/// The envelope carried over pub/sub topics and direct streams.
#[derive(Clone, PartialEq, Message)]
pub struct WireMessage {
    #[prost(bytes = "vec", tag = "1")]
    pub channel_id: Vec<u8>,
    #[prost(enumeration = "Operation", tag = "2")]
    pub operation: i32,
    /// Marshaled [`PeerId`] of the author; empty when unknown.
    #[prost(bytes = "vec", tag = "3")]
    pub sender: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Operation {
    Create = 0,
    Delete = 1,
    Lock = 2,
    Unlock = 3,
    SyncRequest = 4,
    SyncReceive = 5,
    Ping = 6,
    Pong = 7,
}

/// A resting order in a channel.
#[derive(Clone, PartialEq, Message)]
pub struct Order {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub created: Option<Timestamp>,
    #[prost(string, tag = "3")]
    pub asset: String,
    #[prost(string, tag = "4")]
    pub counter_asset: String,
    #[prost(uint64, tag = "5")]
    pub amount: u64,
    #[prost(double, tag = "6")]
    pub price: f64,
    #[prost(enumeration = "State", tag = "7")]
    pub state: i32,
    #[prost(uint64, tag = "8")]
    pub nonce: u64,
    #[prost(bytes = "vec", tag = "9")]
    pub signature: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum State {
    Open = 0,
    Locked = 1,
}

/// The parameters a local caller supplies to create an order.
#[derive(Clone, PartialEq, Message)]
pub struct CreateRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub channel_id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub asset: String,
    #[prost(string, tag = "3")]
    pub counter_asset: String,
    #[prost(uint64, tag = "4")]
    pub amount: u64,
    #[prost(double, tag = "5")]
    pub price: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ChannelOptions {
    #[prost(string, tag = "1")]
    pub asset: String,
    #[prost(string, tag = "2")]
    pub counter_asset: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Channel {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub options: Option<ChannelOptions>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OrderList {
    #[prost(message, repeated, tag = "1")]
    pub orders: Vec<Order>,
}

/// Addressee of a PING, or the declared winner of a PONG.
#[derive(Clone, PartialEq, Message)]
pub struct Recipient {
    #[prost(bytes = "vec", tag = "1")]
    pub peer_id: Vec<u8>,
}

/// A [`WireMessage`] decoded according to its operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Create(Order),
    Delete(Order),
    Lock(Order),
    Unlock(Order),
    SyncRequest,
    SyncReceive(OrderList),
    Ping(Recipient),
    Pong(Recipient),
    /// An operation this build does not know about.
    Unknown(i32),
}

impl WireMessage {
    /// Build an envelope for a channel. The sender is filled in on publish.
    pub fn new(channel_id: &ChannelId, operation: Operation, data: Vec<u8>) -> Self {
        Self {
            channel_id: channel_id.as_bytes().to_vec(),
            operation: operation as i32,
            sender: Vec::new(),
            data,
        }
    }

    /// Attach the author's identity.
    pub fn with_sender(mut self, sender: &PeerId) -> Self {
        self.sender = sender.as_bytes().to_vec();
        self
    }

    /// Decode an envelope from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(Self::decode(bytes)?)
    }

    /// The channel this envelope is scoped to.
    pub fn channel(&self) -> Result<ChannelId, CoreError> {
        ChannelId::from_bytes(self.channel_id.clone())
    }

    /// The declared author, if any.
    pub fn sender_id(&self) -> Option<PeerId> {
        if self.sender.is_empty() {
            None
        } else {
            PeerId::from_bytes(self.sender.clone()).ok()
        }
    }

    /// Decode `data` according to `operation`.
    ///
    /// Unknown operation codes decode to [`Payload::Unknown`] rather than an
    /// error so receivers can ignore them.
    pub fn payload(&self) -> Result<Payload, CoreError> {
        let operation = match Operation::try_from(self.operation) {
            Ok(op) => op,
            Err(_) => return Ok(Payload::Unknown(self.operation)),
        };

        let data = self.data.as_slice();
        Ok(match operation {
            Operation::Create => Payload::Create(Order::decode(data)?),
            Operation::Delete => Payload::Delete(Order::decode(data)?),
            Operation::Lock => Payload::Lock(Order::decode(data)?),
            Operation::Unlock => Payload::Unlock(Order::decode(data)?),
            Operation::SyncRequest => Payload::SyncRequest,
            Operation::SyncReceive => Payload::SyncReceive(OrderList::decode(data)?),
            Operation::Ping => Payload::Ping(Recipient::decode(data)?),
            Operation::Pong => Payload::Pong(Recipient::decode(data)?),
        })
    }
}

impl Order {
    /// Whether the order is currently locked.
    pub fn is_locked(&self) -> bool {
        self.state() == State::Locked
    }
}

impl Recipient {
    pub fn new(peer: &PeerId) -> Self {
        Self {
            peer_id: peer.as_bytes().to_vec(),
        }
    }

    /// Whether this recipient names the given peer.
    pub fn is(&self, peer: &PeerId) -> bool {
        self.peer_id == peer.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    fn sample_order() -> Order {
        Order {
            id: vec![7; 32],
            created: Some(Timestamp {
                seconds: 1_700_000_000,
                nanos: 5,
            }),
            asset: "ETH".into(),
            counter_asset: "BTC".into(),
            amount: 52617562718,
            price: 0.1,
            state: State::Locked as i32,
            nonce: 3,
            signature: vec![1; 64],
        }
    }

    #[test]
    fn test_field_tags_are_stable() {
        // channel_id=1 (len 1), operation=2 (varint 5), sender=3 (len 0 omitted), data=4
        let msg = WireMessage {
            channel_id: b"A".to_vec(),
            operation: Operation::SyncReceive as i32,
            sender: Vec::new(),
            data: vec![0xff],
        };
        assert_eq!(
            msg.encode_to_vec(),
            vec![0x0a, 0x01, b'A', 0x10, 0x05, 0x22, 0x01, 0xff]
        );

        let recipient = Recipient { peer_id: vec![9] };
        assert_eq!(recipient.encode_to_vec(), vec![0x0a, 0x01, 9]);
    }

    #[test]
    fn test_payload_dispatch() {
        let channel = ChannelId::derive("ETH", "BTC");
        let order = sample_order();
        let msg = WireMessage::new(&channel, Operation::Lock, order.encode_to_vec());

        let decoded = WireMessage::from_bytes(&msg.encode_to_vec()).unwrap();
        assert_eq!(decoded.channel().unwrap(), channel);
        assert_eq!(decoded.payload().unwrap(), Payload::Lock(order));
    }

    #[test]
    fn test_sync_request_has_no_body() {
        let channel = ChannelId::derive("ETH", "BTC");
        let msg = WireMessage::new(&channel, Operation::SyncRequest, Vec::new());
        assert_eq!(msg.payload().unwrap(), Payload::SyncRequest);
    }

    #[test]
    fn test_unknown_operation_is_not_an_error() {
        let msg = WireMessage {
            channel_id: b"x".to_vec(),
            operation: 42,
            sender: Vec::new(),
            data: vec![0xde, 0xad],
        };
        assert_eq!(msg.payload().unwrap(), Payload::Unknown(42));
    }

    #[test]
    fn test_garbage_data_fails_to_decode() {
        let channel = ChannelId::derive("ETH", "BTC");
        let msg = WireMessage::new(&channel, Operation::Create, vec![0xff, 0xff, 0xff]);
        assert!(msg.payload().is_err());
    }

    #[test]
    fn test_sender_roundtrip() {
        let keypair = Keypair::from_seed(&[3; 32]);
        let peer = PeerId::from_public_key(&keypair.public_key());
        let channel = ChannelId::derive("A", "B");
        let msg = WireMessage::new(&channel, Operation::Ping, Vec::new()).with_sender(&peer);
        assert_eq!(msg.sender_id(), Some(peer));

        let anonymous = WireMessage::new(&channel, Operation::Ping, Vec::new());
        assert_eq!(anonymous.sender_id(), None);
    }

    #[test]
    fn test_recipient_matches_peer() {
        let a = PeerId::from_public_key(&Keypair::from_seed(&[1; 32]).public_key());
        let b = PeerId::from_public_key(&Keypair::from_seed(&[2; 32]).public_key());
        let recipient = Recipient::new(&a);
        assert!(recipient.is(&a));
        assert!(!recipient.is(&b));
    }
}
