//! Test nodes and helpers.
//!
//! A [`TestNode`] is a complete node (storage, identity, overlay, and
//! services) attached to a shared [`MemoryNetwork`]. A [`Wiretap`] is a bare
//! channel member that only records what is published.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sprawl_core::{ChannelId, CreateRequest, Keypair, Operation, PeerId, WireMessage};
use sprawl_p2p::{MemoryNetwork, Origin, P2p, Receiver};
use tokio::sync::Mutex;
use sprawl_service::{ChannelService, Identity, NodeService, OrderService};
use sprawl_store::MemoryStore;

pub const TEST_ASSET: &str = "ETH";
pub const TEST_COUNTER_ASSET: &str = "BTC";
pub const TEST_AMOUNT: u64 = 52617562718;
pub const TEST_PRICE: f64 = 0.1;

/// How long [`wait_until`] polls before giving up.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A node running on an in-memory network.
pub struct TestNode {
    pub identity: Arc<Identity>,
    pub storage: Arc<MemoryStore>,
    pub p2p: Arc<P2p>,
    pub orders: Arc<OrderService<MemoryStore>>,
    pub channels: ChannelService<MemoryStore>,
    pub node: NodeService,
}

impl TestNode {
    /// Start a node with a random identity.
    pub async fn spawn(network: &Arc<MemoryNetwork>) -> Self {
        Self::with_keypair(network, Keypair::generate()).await
    }

    /// Start a node with a deterministic identity.
    pub async fn with_seed(network: &Arc<MemoryNetwork>, seed: [u8; 32]) -> Self {
        Self::with_keypair(network, Keypair::from_seed(&seed)).await
    }

    async fn with_keypair(network: &Arc<MemoryNetwork>, keypair: Keypair) -> Self {
        let identity = Arc::new(Identity::from_keypair(keypair));
        let storage = Arc::new(MemoryStore::new());

        let transport = network.create_transport(identity.peer_id().clone()).await;
        let p2p = P2p::start(Arc::new(transport)).await;

        let orders = Arc::new(OrderService::new(
            Arc::clone(&storage),
            Arc::clone(&p2p),
            Arc::clone(&identity),
        ));
        p2p.add_receiver(orders.clone()).await;

        Self {
            channels: ChannelService::new(Arc::clone(&storage), Arc::clone(&p2p)),
            node: NodeService::new(Arc::clone(&p2p)),
            identity,
            storage,
            p2p,
            orders,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        self.identity.peer_id()
    }
}

/// Start `count` nodes with distinct deterministic identities.
pub async fn multi_node(network: &Arc<MemoryNetwork>, count: usize) -> Vec<TestNode> {
    let mut nodes = Vec::with_capacity(count);
    for i in 0..count {
        let mut seed = [0u8; 32];
        seed[0] = i as u8;
        seed[1] = 0x5a;
        nodes.push(TestNode::with_seed(network, seed).await);
    }
    nodes
}

/// A silent member of one channel that logs every operation it receives.
pub struct Wiretap {
    p2p: Arc<P2p>,
    log: Arc<OperationLog>,
}

#[derive(Default)]
struct OperationLog {
    seen: Mutex<Vec<(i32, Origin)>>,
}

#[async_trait]
impl Receiver for OperationLog {
    async fn receive(&self, data: &[u8], _from: &PeerId, origin: Origin) -> anyhow::Result<()> {
        let message = WireMessage::from_bytes(data)?;
        self.seen.lock().await.push((message.operation, origin));
        Ok(())
    }
}

impl Wiretap {
    /// Join `channel` with a fresh identity.
    pub async fn join(network: &Arc<MemoryNetwork>, channel: &ChannelId) -> Self {
        let peer = PeerId::from_public_key(&Keypair::generate().public_key());
        let transport = network.create_transport(peer).await;
        let p2p = P2p::start(Arc::new(transport)).await;
        let log = Arc::new(OperationLog::default());
        p2p.add_receiver(log.clone()).await;
        p2p.subscribe(channel).await.expect("wiretap failed to join");
        Self { p2p, log }
    }

    /// How many `operation` messages arrived over pub/sub.
    pub async fn broadcasts(&self, operation: Operation) -> usize {
        self.log
            .seen
            .lock()
            .await
            .iter()
            .filter(|(seen, origin)| *seen == operation as i32 && *origin == Origin::Topic)
            .count()
    }

    pub fn peer_id(&self) -> &PeerId {
        self.p2p.local_peer_id()
    }
}

/// The channel of the test asset pair.
pub fn test_channel() -> ChannelId {
    ChannelId::derive(TEST_ASSET, TEST_COUNTER_ASSET)
}

/// The standard test order request for `channel`.
pub fn test_request(channel: &ChannelId) -> CreateRequest {
    CreateRequest {
        channel_id: channel.as_bytes().to_vec(),
        asset: TEST_ASSET.to_string(),
        counter_asset: TEST_COUNTER_ASSET.to_string(),
        amount: TEST_AMOUNT,
        price: TEST_PRICE,
    }
}

/// Poll `check` until it returns true or [`WAIT_TIMEOUT`] passes.
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
