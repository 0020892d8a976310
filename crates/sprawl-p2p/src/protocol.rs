//! Protocol identifiers and the control messages of channel sync.
//!
//! ```text
//! New member                 Members
//!   |-- SYNC_REQUEST --------->| (stream, first member seen)
//!   |<------- SYNC_RECEIVE ----|
//!   |<------- PING(new) -------| (broadcast by each member)
//!   |-- PONG(winner) --------->| (broadcast, first PING only)
//!   |<------- SYNC_RECEIVE ----| (stream, from the winner)
//! ```

use prost::Message;
use sprawl_core::{ChannelId, Operation, Order, OrderList, PeerId, Recipient, WireMessage};

/// Namespace under which nodes advertise themselves in the DHT.
pub const NAMESPACE: &str = "/sprawl/";

/// Protocol of direct streams.
pub const STREAM_PROTOCOL: &str = "/sprawl/stream/1.0.0";

/// Protocol version advertised by identify.
pub const IDENTIFY_PROTOCOL: &str = "/sprawl/id/1.0.0";

/// Largest payload accepted on a direct stream.
pub const MAX_STREAM_MESSAGE: usize = 16 * 1024 * 1024;

/// Public IPFS bootstrap nodes, dialed when `use_ipfs_peers` is set.
pub const IPFS_BOOTSTRAP_PEERS: &[&str] = &[
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmbLHAnMoJPWSCR5Zhtx6BHJX9KiKNN6tpvbUcqanj75Nb",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmcZf59bWwK5XFi76CZX8cbJ4BhTzzA3gU1ZjYZcYW3dwt",
    "/ip4/104.131.131.82/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ",
];

/// Ask a member for the channel's orders.
pub fn sync_request(channel: &ChannelId) -> WireMessage {
    WireMessage::new(channel, Operation::SyncRequest, Vec::new())
}

/// Answer a sync request with every order held for the channel.
pub fn sync_receive(channel: &ChannelId, orders: Vec<Order>) -> WireMessage {
    WireMessage::new(
        channel,
        Operation::SyncReceive,
        OrderList { orders }.encode_to_vec(),
    )
}

/// Announce that `joined` is new on the channel.
pub fn ping(channel: &ChannelId, joined: &PeerId) -> WireMessage {
    WireMessage::new(channel, Operation::Ping, Recipient::new(joined).encode_to_vec())
}

/// Name `winner` as the member that serves the sync.
pub fn pong(channel: &ChannelId, winner: &PeerId) -> WireMessage {
    WireMessage::new(channel, Operation::Pong, Recipient::new(winner).encode_to_vec())
}
