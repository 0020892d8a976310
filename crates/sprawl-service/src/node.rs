//! Node-level operations: peer listing and blacklisting.

use std::sync::Arc;

use sprawl_core::PeerId;
use sprawl_p2p::P2p;
use tracing::info;

use crate::error::Result;

pub struct NodeService {
    p2p: Arc<P2p>,
}

impl NodeService {
    pub fn new(p2p: Arc<P2p>) -> Self {
        Self { p2p }
    }

    /// Peers currently connected to this node.
    pub async fn get_all_peers(&self) -> Result<Vec<PeerId>> {
        Ok(self.p2p.peers().await?)
    }

    /// Drop and refuse all further traffic from `peer`.
    pub async fn blacklist_peer(&self, peer: &PeerId) -> Result<()> {
        self.p2p.block_peer(peer).await?;
        info!(%peer, "peer blacklisted");
        Ok(())
    }
}
