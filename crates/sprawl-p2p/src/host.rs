//! The libp2p network backend.
//!
//! The swarm is owned by a single task. [`Libp2pNetwork`] talks to it over a
//! command queue, and the task forwards swarm events to topic and stream
//! listeners.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use futures::StreamExt;
use libp2p::gossipsub::{self, IdentTopic, TopicHash};
use libp2p::multiaddr::Protocol;
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::swarm::{ConnectionId, SwarmEvent};
use libp2p::{identify, identity, kad, noise, request_response, tcp, yamux, Multiaddr, Swarm};
use sprawl_core::{Keypair, PeerId};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::behaviour::{BehaviourOptions, SprawlBehaviour, SprawlBehaviourEvent};
use crate::error::{P2pError, Result};
use crate::protocol::{IPFS_BOOTSTRAP_PEERS, NAMESPACE};
use crate::transport::{DirectMessage, DirectMessages, Network, TopicEvent, TopicEvents};

/// How long an idle connection is kept open, in seconds.
const IDLE_CONNECTION_TIMEOUT_SECS: u64 = 60;

/// Settings for the libp2p host.
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    /// TCP port to listen on. 0 picks a free port.
    pub port: u16,
    /// Publicly reachable IPv4 address to advertise.
    pub external_ip: Option<String>,
    /// Multiaddrs of peers to dial at startup.
    pub bootstrap_peers: Vec<String>,
    /// Also dial the public IPFS bootstrap nodes.
    pub use_ipfs_peers: bool,
    pub enable_relay: bool,
    pub enable_nat_port_map: bool,
}

impl HostConfig {
    /// Every bootstrap address that parses. Bad entries are logged and skipped.
    fn bootstrap_addrs(&self) -> Vec<Multiaddr> {
        let ipfs = IPFS_BOOTSTRAP_PEERS
            .iter()
            .filter(|_| self.use_ipfs_peers)
            .map(|addr| addr.to_string());

        self.bootstrap_peers
            .iter()
            .cloned()
            .chain(ipfs)
            .filter_map(|addr| match addr.parse::<Multiaddr>() {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    warn!(%addr, error = %err, "ignoring bad bootstrap address");
                    None
                }
            })
            .collect()
    }
}

/// Work for the swarm task.
enum Command {
    Subscribe {
        topic: String,
        events: mpsc::UnboundedSender<TopicEvent>,
        reply: oneshot::Sender<Result<()>>,
    },
    Unsubscribe(String),
    Publish(String, Vec<u8>),
    SendDirect(libp2p::PeerId, Vec<u8>),
    Dial(Multiaddr, oneshot::Sender<Result<()>>),
    Discover,
    ConnectedPeers(oneshot::Sender<Vec<libp2p::PeerId>>),
    Block(libp2p::PeerId),
    Shutdown,
}

/// Handle to a running libp2p host.
pub struct Libp2pNetwork {
    local_peer_id: PeerId,
    commands: mpsc::UnboundedSender<Command>,
    direct: Mutex<Option<DirectMessages>>,
}

impl Libp2pNetwork {
    /// Build the host, start listening, and bootstrap.
    ///
    /// Failing to build or bind the host is fatal. Failing to reach
    /// bootstrap peers is logged and tolerated.
    pub async fn start(keypair: &Keypair, config: HostConfig) -> Result<Arc<Self>> {
        let key = identity::Keypair::ed25519_from_bytes(keypair.seed())
            .map_err(|err| P2pError::Init(err.to_string()))?;
        let local_peer_id = PeerId::from_bytes(key.public().to_peer_id().to_bytes())?;

        let options = BehaviourOptions {
            enable_relay: config.enable_relay,
            enable_nat_port_map: config.enable_nat_port_map,
        };
        let mut swarm = libp2p::SwarmBuilder::with_existing_identity(key)
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|err| P2pError::Init(err.to_string()))?
            .with_dns()
            .map_err(|err| P2pError::Init(err.to_string()))?
            .with_behaviour(|key| SprawlBehaviour::new(key, options))
            .map_err(|err| P2pError::Init(err.to_string()))?
            .with_swarm_config(|cfg| {
                cfg.with_idle_connection_timeout(Duration::from_secs(IDLE_CONNECTION_TIMEOUT_SECS))
            })
            .build();

        let listen: Multiaddr = format!("/ip4/0.0.0.0/tcp/{}", config.port)
            .parse()
            .map_err(|err: libp2p::multiaddr::Error| P2pError::Init(err.to_string()))?;
        swarm
            .listen_on(listen)
            .map_err(|err| P2pError::Init(err.to_string()))?;

        if let Some(ip) = &config.external_ip {
            match format!("/ip4/{ip}/tcp/{}", config.port).parse::<Multiaddr>() {
                Ok(addr) => swarm.add_external_address(addr),
                Err(err) => warn!(%ip, error = %err, "ignoring bad external address"),
            }
        }

        let bootstrap = config.bootstrap_addrs();
        for addr in &bootstrap {
            if let Some((peer, transport_addr)) = split_peer(addr) {
                swarm
                    .behaviour_mut()
                    .kademlia
                    .add_address(&peer, transport_addr);
            }
        }

        let (commands, queue) = mpsc::unbounded_channel();
        let (direct_tx, direct_rx) = mpsc::unbounded_channel();
        tokio::spawn(
            SwarmTask {
                swarm,
                queue,
                topics: HashMap::new(),
                direct: direct_tx,
                pending_dials: HashMap::new(),
            }
            .run(),
        );

        let network = Arc::new(Self {
            local_peer_id,
            commands,
            direct: Mutex::new(Some(direct_rx)),
        });
        network.bootstrap(bootstrap).await;
        Ok(network)
    }

    /// Dial every bootstrap peer concurrently, then start DHT discovery.
    #[instrument(skip_all, fields(peers = addrs.len()))]
    async fn bootstrap(&self, addrs: Vec<Multiaddr>) {
        let dials = addrs.into_iter().map(|addr| async move {
            let result = self.dial(addr.clone()).await;
            (addr, result)
        });

        let mut connected = 0;
        for (addr, result) in join_all(dials).await {
            match result {
                Ok(()) => connected += 1,
                Err(err) => warn!(%addr, error = %err, "bootstrap dial failed"),
            }
        }
        info!(connected, "bootstrap complete");

        if let Err(err) = self.command(Command::Discover) {
            warn!(error = %err, "discovery not started");
        }
    }

    /// Dial an address and wait for the connection to settle.
    pub async fn dial(&self, addr: Multiaddr) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.command(Command::Dial(addr, reply))?;
        response.await.map_err(|_| P2pError::Closed)?
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| P2pError::Closed)
    }
}

#[async_trait]
impl Network for Libp2pNetwork {
    fn local_peer_id(&self) -> PeerId {
        self.local_peer_id.clone()
    }

    async fn subscribe(&self, topic: &str) -> Result<TopicEvents> {
        let (events, receiver) = mpsc::unbounded_channel();
        let (reply, response) = oneshot::channel();
        self.command(Command::Subscribe {
            topic: topic.to_string(),
            events,
            reply,
        })?;
        response.await.map_err(|_| P2pError::Closed)??;
        Ok(receiver)
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.command(Command::Unsubscribe(topic.to_string()))
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()> {
        self.command(Command::Publish(topic.to_string(), data))
    }

    async fn send_direct(&self, peer: &PeerId, data: Vec<u8>) -> Result<()> {
        self.command(Command::SendDirect(to_libp2p(peer)?, data))
    }

    async fn take_direct_messages(&self) -> Option<DirectMessages> {
        self.direct.lock().await.take()
    }

    async fn connected_peers(&self) -> Result<Vec<PeerId>> {
        let (reply, response) = oneshot::channel();
        self.command(Command::ConnectedPeers(reply))?;
        let peers = response.await.map_err(|_| P2pError::Closed)?;
        peers.iter().map(from_libp2p).collect()
    }

    async fn block_peer(&self, peer: &PeerId) -> Result<()> {
        self.command(Command::Block(to_libp2p(peer)?))
    }

    async fn shutdown(&self) -> Result<()> {
        // The task may already be gone
        let _ = self.command(Command::Shutdown);
        Ok(())
    }
}

struct SwarmTask {
    swarm: Swarm<SprawlBehaviour>,
    queue: mpsc::UnboundedReceiver<Command>,
    topics: HashMap<TopicHash, mpsc::UnboundedSender<TopicEvent>>,
    direct: mpsc::UnboundedSender<DirectMessage>,
    pending_dials: HashMap<ConnectionId, oneshot::Sender<Result<()>>>,
}

impl SwarmTask {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.queue.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                event = self.swarm.select_next_some() => self.handle_event(event),
            }
        }
        info!("host stopped");
    }

    fn handle_command(&mut self, command: Command) {
        let behaviour = self.swarm.behaviour_mut();
        match command {
            Command::Subscribe {
                topic,
                events,
                reply,
            } => {
                let topic = IdentTopic::new(topic);
                let result = match behaviour.gossipsub.subscribe(&topic) {
                    Ok(_) => {
                        let hash = topic.hash();
                        for (peer, topics) in behaviour.gossipsub.all_peers() {
                            if topics.contains(&&hash) {
                                if let Ok(peer) = from_libp2p(peer) {
                                    let _ = events.send(TopicEvent::PeerJoined(peer));
                                }
                            }
                        }
                        self.topics.insert(hash, events);
                        Ok(())
                    }
                    Err(err) => Err(P2pError::Subscription(err.to_string())),
                };
                let _ = reply.send(result);
            }
            Command::Unsubscribe(topic) => {
                let topic = IdentTopic::new(topic);
                if let Err(err) = behaviour.gossipsub.unsubscribe(&topic) {
                    warn!(%topic, error = %err, "unsubscribe failed");
                }
                self.topics.remove(&topic.hash());
            }
            Command::Publish(topic, data) => {
                if let Err(err) = behaviour.gossipsub.publish(IdentTopic::new(&topic), data) {
                    debug!(%topic, error = %err, "publish not delivered");
                }
            }
            Command::SendDirect(peer, data) => {
                behaviour.streams.send_request(&peer, data);
            }
            Command::Dial(addr, reply) => {
                let opts = DialOpts::from(addr);
                let connection = opts.connection_id();
                match self.swarm.dial(opts) {
                    Ok(()) => {
                        self.pending_dials.insert(connection, reply);
                    }
                    Err(err) => {
                        let _ = reply.send(Err(P2pError::Transport(err.to_string())));
                    }
                }
            }
            Command::Discover => self.discover(),
            Command::ConnectedPeers(reply) => {
                let _ = reply.send(self.swarm.connected_peers().copied().collect());
            }
            Command::Block(peer) => behaviour.blocked.block_peer(peer),
            Command::Shutdown => {}
        }
    }

    /// Advertise under the namespace and look for others doing the same.
    fn discover(&mut self) {
        let kademlia = &mut self.swarm.behaviour_mut().kademlia;
        if let Err(err) = kademlia.bootstrap() {
            warn!(error = ?err, "dht bootstrap failed");
        }

        let key = kad::RecordKey::new(&NAMESPACE);
        if let Err(err) = kademlia.start_providing(key.clone()) {
            warn!(error = %err, "advertising failed");
        }
        kademlia.get_providers(key);
    }

    fn handle_event(&mut self, event: SwarmEvent<SprawlBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, peer = %self.swarm.local_peer_id(), "listening");
            }
            SwarmEvent::ConnectionEstablished {
                peer_id,
                connection_id,
                ..
            } => {
                debug!(%peer_id, "connection established");
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    let _ = reply.send(Ok(()));
                }
            }
            SwarmEvent::OutgoingConnectionError {
                connection_id,
                error,
                ..
            } => {
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    let _ = reply.send(Err(P2pError::Transport(error.to_string())));
                }
            }
            SwarmEvent::Behaviour(event) => self.handle_behaviour_event(event),
            _ => {}
        }
    }

    fn handle_behaviour_event(&mut self, event: SprawlBehaviourEvent) {
        match event {
            SprawlBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            }) => {
                let Some(events) = self.topics.get(&message.topic) else {
                    return;
                };
                let author = message.source.unwrap_or(propagation_source);
                if let Ok(from) = from_libp2p(&author) {
                    let _ = events.send(TopicEvent::Message {
                        from,
                        data: message.data,
                    });
                }
            }
            SprawlBehaviourEvent::Gossipsub(gossipsub::Event::Subscribed { peer_id, topic }) => {
                if let (Some(events), Ok(peer)) = (self.topics.get(&topic), from_libp2p(&peer_id)) {
                    let _ = events.send(TopicEvent::PeerJoined(peer));
                }
            }
            SprawlBehaviourEvent::Streams(request_response::Event::Message {
                peer,
                message:
                    request_response::Message::Request {
                        request, channel, ..
                    },
                ..
            }) => {
                if self
                    .swarm
                    .behaviour_mut()
                    .streams
                    .send_response(channel, ())
                    .is_err()
                {
                    debug!(%peer, "stream closed before acknowledgement");
                }
                if let Ok(from) = from_libp2p(&peer) {
                    let _ = self.direct.send(DirectMessage {
                        from,
                        data: request,
                    });
                }
            }
            SprawlBehaviourEvent::Streams(request_response::Event::OutboundFailure {
                peer,
                error,
                ..
            }) => {
                warn!(%peer, error = %error, "stream write failed");
            }
            SprawlBehaviourEvent::Identify(identify::Event::Received { peer_id, info, .. }) => {
                let kademlia = &mut self.swarm.behaviour_mut().kademlia;
                for addr in info.listen_addrs {
                    kademlia.add_address(&peer_id, addr);
                }
            }
            SprawlBehaviourEvent::Kademlia(kad::Event::OutboundQueryProgressed {
                result:
                    kad::QueryResult::GetProviders(Ok(kad::GetProvidersOk::FoundProviders {
                        providers,
                        ..
                    })),
                ..
            }) => {
                let local = *self.swarm.local_peer_id();
                for provider in providers {
                    if provider == local || self.swarm.is_connected(&provider) {
                        continue;
                    }
                    debug!(peer = %provider, "dialing discovered peer");
                    if let Err(err) = self.swarm.dial(provider) {
                        debug!(peer = %provider, error = %err, "dial failed");
                    }
                }
            }
            _ => {}
        }
    }
}

/// Split `/.../p2p/<id>` into the peer id and its transport address.
fn split_peer(addr: &Multiaddr) -> Option<(libp2p::PeerId, Multiaddr)> {
    let mut transport = addr.clone();
    match transport.pop() {
        Some(Protocol::P2p(peer)) => Some((peer, transport)),
        _ => None,
    }
}

fn to_libp2p(peer: &PeerId) -> Result<libp2p::PeerId> {
    libp2p::PeerId::from_bytes(peer.as_bytes())
        .map_err(|err| P2pError::PeerNotFound(format!("{peer}: {err}")))
}

fn from_libp2p(peer: &libp2p::PeerId) -> Result<PeerId> {
    Ok(PeerId::from_bytes(peer.to_bytes())?)
}
