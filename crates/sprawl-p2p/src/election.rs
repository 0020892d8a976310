//! Best-effort choice of which member syncs a newcomer.
//!
//! When a peer joins a channel every member broadcasts a PING naming it.
//! The newcomer answers only the first PING per channel with a PONG naming
//! that PING's sender, and the named member streams the channel's orders.
//! Consensus is soft: concurrent PINGs can produce duplicate syncs, which
//! the idempotent merge absorbs.
//!
//! A SYNC_RECEIVE is merged without per-order authentication, so it is
//! accepted once from each peer this node asked directly and once from the
//! member it elected. Anything else is unsolicited.

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use sprawl_core::{ChannelId, PeerId, Recipient, WireMessage};
use tracing::debug;

use crate::protocol;

/// Per-channel election state of one node.
pub struct Election {
    local: PeerId,
    /// Channels with a sync in flight, mapped to the member we picked.
    synchronizing: DashMap<ChannelId, PeerId>,
    /// Outstanding direct SYNC_REQUESTs.
    requests: DashSet<(ChannelId, PeerId)>,
}

impl Election {
    pub fn new(local: PeerId) -> Self {
        Self {
            local,
            synchronizing: DashMap::new(),
            requests: DashSet::new(),
        }
    }

    /// Note a SYNC_REQUEST sent to `peer`.
    pub fn requested(&self, channel: &ChannelId, peer: &PeerId) {
        self.requests.insert((channel.clone(), peer.clone()));
    }

    /// Forget a SYNC_REQUEST that never left this node.
    pub fn cancel_request(&self, channel: &ChannelId, peer: &PeerId) {
        self.requests.remove(&(channel.clone(), peer.clone()));
    }

    /// Whether a SYNC_RECEIVE from `peer` answers this node, consuming the
    /// request or the election it answers.
    pub fn accept_reply(&self, channel: &ChannelId, peer: &PeerId) -> bool {
        let elected = self
            .synchronizing
            .remove_if(channel, |_, winner| winner == peer)
            .is_some();
        let asked = self
            .requests
            .remove(&(channel.clone(), peer.clone()))
            .is_some();
        elected || asked
    }

    /// The PING a member broadcasts when `joined` appears on `channel`.
    pub fn ping(&self, channel: &ChannelId, joined: &PeerId) -> WireMessage {
        protocol::ping(channel, joined)
    }

    /// Handle a PING from `pinger`.
    ///
    /// Returns the PONG to broadcast when the PING names this node and no
    /// sync is already in flight for the channel.
    pub fn accept_ping(
        &self,
        channel: &ChannelId,
        recipient: &Recipient,
        pinger: &PeerId,
    ) -> Option<WireMessage> {
        if !recipient.is(&self.local) || pinger == &self.local {
            return None;
        }

        match self.synchronizing.entry(channel.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                debug!(%channel, winner = %pinger, "electing sync winner");
                slot.insert(pinger.clone());
                Some(protocol::pong(channel, pinger))
            }
        }
    }

    /// Whether a PONG names this node as the winner.
    pub fn won(&self, recipient: &Recipient) -> bool {
        recipient.is(&self.local)
    }

    /// Whether a sync is in flight for `channel`.
    pub fn is_synchronizing(&self, channel: &ChannelId) -> bool {
        self.synchronizing.contains_key(channel)
    }

    /// Drop all sync state for a channel this node is leaving.
    pub fn finish(&self, channel: &ChannelId) {
        self.synchronizing.remove(channel);
        self.requests.retain(|(pending, _)| pending != channel);
    }
}
