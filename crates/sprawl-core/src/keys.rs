//! Storage key layout.
//!
//! Orders live under `ORDER_PREFIX || channel || 0x00 || order_id`, so one
//! prefix scan returns exactly one channel's orders. Channels live under
//! `CHANNEL_PREFIX || channel`.

use crate::ids::ChannelId;

pub const ORDER_PREFIX: &[u8] = b"order.";
pub const CHANNEL_PREFIX: &[u8] = b"channel.";

/// Ends the channel segment of an order key. Without it the orders of
/// `"A,B"` would share a prefix with those of `"A,BC"`.
pub const CHANNEL_TERMINATOR: u8 = 0x00;

/// Where the node's Ed25519 seed is persisted.
pub const PRIVATE_KEY: &[u8] = b"private_key";
/// Where the node's Ed25519 public key is persisted.
pub const PUBLIC_KEY: &[u8] = b"public_key";

/// Prefix covering every order of `channel`.
pub fn channel_orders_prefix(channel: &ChannelId) -> Vec<u8> {
    let mut key = Vec::with_capacity(ORDER_PREFIX.len() + channel.as_bytes().len() + 1);
    key.extend_from_slice(ORDER_PREFIX);
    key.extend_from_slice(channel.as_bytes());
    key.push(CHANNEL_TERMINATOR);
    key
}

/// Key of one order.
pub fn order_key(channel: &ChannelId, order_id: &[u8]) -> Vec<u8> {
    let mut key = channel_orders_prefix(channel);
    key.extend_from_slice(order_id);
    key
}

/// Key of a joined channel's record.
pub fn channel_key(channel: &ChannelId) -> Vec<u8> {
    let mut key = CHANNEL_PREFIX.to_vec();
    key.extend_from_slice(channel.as_bytes());
    key
}
