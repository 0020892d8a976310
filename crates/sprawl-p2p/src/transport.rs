//! Network backend abstraction.
//!
//! A [`Network`] provides the two primitives the overlay is built from:
//! topic pub/sub (one topic per channel) and direct peer-to-peer delivery.
//! The production backend is [`crate::host::Libp2pNetwork`]; the
//! [`memory`] backend wires nodes together in-process for tests.

use async_trait::async_trait;
use sprawl_core::PeerId;
use tokio::sync::mpsc;

use crate::error::Result;

/// Something that happened on a subscribed topic.
#[derive(Debug, Clone, PartialEq)]
pub enum TopicEvent {
    /// A message published by another peer.
    Message { from: PeerId, data: Vec<u8> },
    /// A peer started listening on the topic.
    PeerJoined(PeerId),
}

/// Bytes written to this node over a direct stream.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectMessage {
    pub from: PeerId,
    pub data: Vec<u8>,
}

/// Events of one topic subscription. Dropped when the topic is left.
pub type TopicEvents = mpsc::UnboundedReceiver<TopicEvent>;

/// Every direct message addressed to this node.
pub type DirectMessages = mpsc::UnboundedReceiver<DirectMessage>;

/// Backend trait for pub/sub and direct delivery.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Network: Send + Sync {
    /// Get the local node's identity.
    fn local_peer_id(&self) -> PeerId;

    /// Join a topic.
    ///
    /// The returned receiver yields a [`TopicEvent::PeerJoined`] for every
    /// peer already on the topic, then live traffic.
    async fn subscribe(&self, topic: &str) -> Result<TopicEvents>;

    /// Leave a topic. Its event receiver closes.
    async fn unsubscribe(&self, topic: &str) -> Result<()>;

    /// Publish to every other subscriber of a topic.
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()>;

    /// Deliver bytes to one peer over a direct stream.
    async fn send_direct(&self, peer: &PeerId, data: Vec<u8>) -> Result<()>;

    /// Take the inbound direct-message receiver. Yields `Some` once.
    async fn take_direct_messages(&self) -> Option<DirectMessages>;

    /// List currently connected peers.
    async fn connected_peers(&self) -> Result<Vec<PeerId>>;

    /// Refuse all further traffic with `peer`.
    async fn block_peer(&self, peer: &PeerId) -> Result<()>;

    /// Leave the network.
    async fn shutdown(&self) -> Result<()>;
}

/// An in-process network for tests.
///
/// Every transport created from one [`MemoryNetwork`] can reach every
/// other. Topic membership is tracked centrally so joins are announced to
/// both sides the way gossip subscription events are.
pub mod memory {
    use super::*;
    use crate::error::P2pError;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use tokio::sync::{Mutex, RwLock};

    struct Node {
        direct: mpsc::UnboundedSender<DirectMessage>,
        topics: HashMap<String, mpsc::UnboundedSender<TopicEvent>>,
        blocked: HashSet<PeerId>,
    }

    /// Shared state for the memory network.
    #[derive(Default)]
    pub struct MemoryNetwork {
        nodes: RwLock<HashMap<PeerId, Node>>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Create a transport connected to this network.
        pub async fn create_transport(self: &Arc<Self>, peer_id: PeerId) -> MemoryTransport {
            let (tx, rx) = mpsc::unbounded_channel();

            self.nodes.write().await.insert(
                peer_id.clone(),
                Node {
                    direct: tx,
                    topics: HashMap::new(),
                    blocked: HashSet::new(),
                },
            );

            MemoryTransport {
                peer_id,
                network: Arc::clone(self),
                direct: Mutex::new(Some(rx)),
            }
        }

        /// Number of attached nodes.
        pub async fn len(&self) -> usize {
            self.nodes.read().await.len()
        }

        /// Whether no node is attached.
        pub async fn is_empty(&self) -> bool {
            self.nodes.read().await.is_empty()
        }

        fn reachable(nodes: &HashMap<PeerId, Node>, a: &PeerId, b: &PeerId) -> bool {
            let blocks = |x: &PeerId, y: &PeerId| {
                nodes
                    .get(x)
                    .map(|node| node.blocked.contains(y))
                    .unwrap_or(false)
            };
            !blocks(a, b) && !blocks(b, a)
        }
    }

    /// In-memory transport implementation.
    pub struct MemoryTransport {
        peer_id: PeerId,
        network: Arc<MemoryNetwork>,
        direct: Mutex<Option<DirectMessages>>,
    }

    #[async_trait]
    impl Network for MemoryTransport {
        fn local_peer_id(&self) -> PeerId {
            self.peer_id.clone()
        }

        async fn subscribe(&self, topic: &str) -> Result<TopicEvents> {
            let (tx, rx) = mpsc::unbounded_channel();
            let mut nodes = self.network.nodes.write().await;

            for (peer, node) in nodes.iter() {
                if peer == &self.peer_id
                    || !MemoryNetwork::reachable(&nodes, &self.peer_id, peer)
                {
                    continue;
                }
                if let Some(events) = node.topics.get(topic) {
                    let _ = events.send(TopicEvent::PeerJoined(self.peer_id.clone()));
                    let _ = tx.send(TopicEvent::PeerJoined(peer.clone()));
                }
            }

            let node = nodes
                .get_mut(&self.peer_id)
                .ok_or_else(|| P2pError::Transport("node has left the network".into()))?;
            node.topics.insert(topic.to_string(), tx);
            Ok(rx)
        }

        async fn unsubscribe(&self, topic: &str) -> Result<()> {
            if let Some(node) = self.network.nodes.write().await.get_mut(&self.peer_id) {
                node.topics.remove(topic);
            }
            Ok(())
        }

        async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()> {
            let nodes = self.network.nodes.read().await;
            if !nodes.contains_key(&self.peer_id) {
                return Err(P2pError::Closed);
            }

            for (peer, node) in nodes.iter() {
                if peer == &self.peer_id
                    || !MemoryNetwork::reachable(&nodes, &self.peer_id, peer)
                {
                    continue;
                }
                if let Some(events) = node.topics.get(topic) {
                    // Ignore errors (the subscriber may be shutting down)
                    let _ = events.send(TopicEvent::Message {
                        from: self.peer_id.clone(),
                        data: data.clone(),
                    });
                }
            }
            Ok(())
        }

        async fn send_direct(&self, peer: &PeerId, data: Vec<u8>) -> Result<()> {
            let nodes = self.network.nodes.read().await;
            let node = nodes
                .get(peer)
                .ok_or_else(|| P2pError::PeerNotFound(peer.to_string()))?;
            if !MemoryNetwork::reachable(&nodes, &self.peer_id, peer) {
                return Err(P2pError::PeerBlocked(peer.to_string()));
            }

            node.direct
                .send(DirectMessage {
                    from: self.peer_id.clone(),
                    data,
                })
                .map_err(|_| P2pError::Transport("peer disconnected".into()))
        }

        async fn take_direct_messages(&self) -> Option<DirectMessages> {
            self.direct.lock().await.take()
        }

        async fn connected_peers(&self) -> Result<Vec<PeerId>> {
            let nodes = self.network.nodes.read().await;
            Ok(nodes
                .keys()
                .filter(|peer| {
                    *peer != &self.peer_id
                        && MemoryNetwork::reachable(&nodes, &self.peer_id, peer)
                })
                .cloned()
                .collect())
        }

        async fn block_peer(&self, peer: &PeerId) -> Result<()> {
            let mut nodes = self.network.nodes.write().await;
            let node = nodes.get_mut(&self.peer_id).ok_or(P2pError::Closed)?;
            node.blocked.insert(peer.clone());
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            self.network.nodes.write().await.remove(&self.peer_id);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryNetwork;
    use super::*;
    use sprawl_core::Keypair;

    fn peer() -> PeerId {
        PeerId::from_public_key(&Keypair::generate().public_key())
    }

    #[tokio::test]
    async fn test_memory_publish_reaches_other_subscribers() {
        let network = MemoryNetwork::new();
        let (a, b, c) = (peer(), peer(), peer());

        let transport_a = network.create_transport(a.clone()).await;
        let transport_b = network.create_transport(b.clone()).await;
        let transport_c = network.create_transport(c.clone()).await;

        let mut events_a = transport_a.subscribe("BTC,ETH").await.unwrap();
        let mut events_b = transport_b.subscribe("BTC,ETH").await.unwrap();
        let _ = transport_c.subscribe("DOGE,ETH").await.unwrap();

        // Joins are announced both ways
        assert_eq!(events_a.recv().await, Some(TopicEvent::PeerJoined(b.clone())));
        assert_eq!(events_b.recv().await, Some(TopicEvent::PeerJoined(a.clone())));

        transport_a
            .publish("BTC,ETH", b"hello".to_vec())
            .await
            .unwrap();

        assert_eq!(
            events_b.recv().await,
            Some(TopicEvent::Message {
                from: a,
                data: b"hello".to_vec()
            })
        );
        // The publisher does not hear itself
        assert!(events_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_memory_direct_send() {
        let network = MemoryNetwork::new();
        let (a, b) = (peer(), peer());

        let transport_a = network.create_transport(a.clone()).await;
        let transport_b = network.create_transport(b.clone()).await;

        let mut inbound = transport_b.take_direct_messages().await.unwrap();
        assert!(transport_b.take_direct_messages().await.is_none());

        transport_a.send_direct(&b, vec![1, 2, 3]).await.unwrap();
        let message = inbound.recv().await.unwrap();
        assert_eq!(message.from, a);
        assert_eq!(message.data, vec![1, 2, 3]);

        assert!(matches!(
            transport_a.send_direct(&peer(), vec![]).await,
            Err(crate::P2pError::PeerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_block_drops_traffic_both_ways() {
        let network = MemoryNetwork::new();
        let (a, b) = (peer(), peer());

        let transport_a = network.create_transport(a.clone()).await;
        let transport_b = network.create_transport(b.clone()).await;

        transport_a.block_peer(&b).await.unwrap();

        assert!(transport_a.connected_peers().await.unwrap().is_empty());
        assert!(transport_b.connected_peers().await.unwrap().is_empty());
        assert!(transport_b.send_direct(&a, vec![1]).await.is_err());

        let mut events_a = transport_a.subscribe("t").await.unwrap();
        let _events_b = transport_b.subscribe("t").await.unwrap();
        transport_b.publish("t", vec![1]).await.unwrap();
        assert!(events_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_memory_shutdown_leaves_network() {
        let network = MemoryNetwork::new();
        let transport = network.create_transport(peer()).await;
        assert_eq!(network.len().await, 1);

        transport.shutdown().await.unwrap();
        assert!(network.is_empty().await);
        assert!(transport.subscribe("t").await.is_err());
    }
}
