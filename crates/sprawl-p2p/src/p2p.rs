//! The overlay: channel subscriptions, outbound publishing, direct streams,
//! and delivery of inbound traffic to a single [`Receiver`].

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use prost::Message;
use sprawl_core::{ChannelId, PeerId, WireMessage};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info, warn};

use crate::election::Election;
use crate::error::{P2pError, Result};
use crate::protocol;
use crate::transport::{DirectMessages, Network, TopicEvent, TopicEvents};

/// How an inbound message reached this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Published on a subscribed channel's topic.
    Topic,
    /// Written to a direct stream the sender opened to this node.
    Stream,
}

/// Consumer of every message the overlay delivers.
///
/// `from` is the transport-authenticated author. Errors are logged by the
/// overlay and otherwise dropped.
#[async_trait]
pub trait Receiver: Send + Sync {
    async fn receive(&self, data: &[u8], from: &PeerId, origin: Origin) -> anyhow::Result<()>;
}

/// A direct stream to one peer.
#[derive(Clone)]
pub struct Stream {
    peer: PeerId,
    network: Arc<dyn Network>,
}

impl Stream {
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Write one message to the peer.
    pub async fn write_to_stream(&self, data: Vec<u8>) -> Result<()> {
        self.network.send_direct(&self.peer, data).await
    }
}

struct Subscription {
    cancel: watch::Sender<bool>,
}

/// The overlay handle shared by services.
pub struct P2p {
    network: Arc<dyn Network>,
    local_peer_id: PeerId,
    subscriptions: DashMap<ChannelId, Subscription>,
    streams: DashMap<PeerId, Stream>,
    outbound: mpsc::UnboundedSender<WireMessage>,
    receiver: RwLock<Option<Arc<dyn Receiver>>>,
    election: Election,
    shutdown: watch::Sender<bool>,
}

impl P2p {
    /// Start the overlay on top of a network backend.
    ///
    /// Spawns the outbound publisher and the inbound stream listener.
    pub async fn start(network: Arc<dyn Network>) -> Arc<Self> {
        let local_peer_id = network.local_peer_id();
        let (outbound, queue) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);

        let p2p = Arc::new(Self {
            network: Arc::clone(&network),
            local_peer_id: local_peer_id.clone(),
            subscriptions: DashMap::new(),
            streams: DashMap::new(),
            outbound,
            receiver: RwLock::new(None),
            election: Election::new(local_peer_id.clone()),
            shutdown,
        });

        tokio::spawn(run_outbound(
            network,
            local_peer_id,
            queue,
            p2p.shutdown.subscribe(),
        ));

        match p2p.network.take_direct_messages().await {
            Some(inbound) => {
                tokio::spawn(run_inbound(
                    Arc::downgrade(&p2p),
                    inbound,
                    p2p.shutdown.subscribe(),
                ));
            }
            None => warn!("direct messages already taken, streams will not be received"),
        }

        p2p
    }

    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_peer_id
    }

    pub fn election(&self) -> &Election {
        &self.election
    }

    /// Register the consumer of inbound messages, replacing any previous one.
    pub async fn add_receiver(&self, receiver: Arc<dyn Receiver>) {
        *self.receiver.write().await = Some(receiver);
    }

    /// Queue a message for publishing on its channel's topic.
    ///
    /// Returns once queued. Messages are published in queue order.
    pub fn send(&self, message: WireMessage) -> Result<()> {
        self.outbound.send(message).map_err(|_| P2pError::Closed)
    }

    /// Join a channel's topic and start listening on it.
    ///
    /// Subscribing twice is a no-op.
    pub async fn subscribe(self: &Arc<Self>, channel: &ChannelId) -> Result<()> {
        let cancelled = match self.subscriptions.entry(channel.clone()) {
            Entry::Occupied(_) => return Ok(()),
            Entry::Vacant(slot) => {
                let (cancel, cancelled) = watch::channel(false);
                slot.insert(Subscription { cancel });
                cancelled
            }
        };

        let events = match self.network.subscribe(&channel.topic()).await {
            Ok(events) => events,
            Err(err) => {
                self.subscriptions.remove(channel);
                return Err(err);
            }
        };

        info!(%channel, "subscribed");
        tokio::spawn(listen(
            Arc::downgrade(self),
            channel.clone(),
            events,
            cancelled,
        ));
        Ok(())
    }

    /// Leave a channel's topic. Unknown channels are ignored.
    pub async fn unsubscribe(&self, channel: &ChannelId) -> Result<()> {
        let Some((_, subscription)) = self.subscriptions.remove(channel) else {
            return Ok(());
        };

        let _ = subscription.cancel.send(true);
        self.election.finish(channel);
        self.network.unsubscribe(&channel.topic()).await?;
        info!(%channel, "unsubscribed");
        Ok(())
    }

    pub fn is_subscribed(&self, channel: &ChannelId) -> bool {
        self.subscriptions.contains_key(channel)
    }

    pub fn subscribed_channels(&self) -> Vec<ChannelId> {
        self.subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Open (or reuse) a direct stream to `peer`.
    pub fn open_stream(&self, peer: &PeerId) -> Result<Stream> {
        if peer == &self.local_peer_id {
            return Err(P2pError::PeerNotFound("cannot open a stream to self".into()));
        }

        let stream = self
            .streams
            .entry(peer.clone())
            .or_insert_with(|| Stream {
                peer: peer.clone(),
                network: Arc::clone(&self.network),
            })
            .clone();
        Ok(stream)
    }

    /// Forget the stream to `peer`.
    pub fn close_stream(&self, peer: &PeerId) {
        self.streams.remove(peer);
    }

    /// Deliver one message to `peer` over a short-lived stream.
    pub async fn send_direct(&self, peer: &PeerId, message: WireMessage) -> Result<()> {
        let data = message.with_sender(&self.local_peer_id).encode_to_vec();
        let stream = self.open_stream(peer)?;
        let written = stream.write_to_stream(data).await;
        self.close_stream(peer);
        written
    }

    /// Peers currently connected to this node.
    pub async fn peers(&self) -> Result<Vec<PeerId>> {
        self.network.connected_peers().await
    }

    /// Block a peer and drop its stream.
    pub async fn block_peer(&self, peer: &PeerId) -> Result<()> {
        self.close_stream(peer);
        self.network.block_peer(peer).await?;
        info!(%peer, "peer blocked");
        Ok(())
    }

    /// Leave every channel, stop the workers, and shut the network down.
    pub async fn close(&self) -> Result<()> {
        for channel in self.subscribed_channels() {
            if let Err(err) = self.unsubscribe(&channel).await {
                warn!(%channel, error = %err, "unsubscribe failed during close");
            }
        }

        self.streams.clear();
        *self.receiver.write().await = None;
        let _ = self.shutdown.send(true);
        self.network.shutdown().await
    }

    async fn deliver(&self, data: &[u8], from: &PeerId, origin: Origin) {
        let receiver = self.receiver.read().await.clone();
        match receiver {
            Some(receiver) => {
                if let Err(err) = receiver.receive(data, from, origin).await {
                    debug!(%from, ?origin, error = %err, "message rejected");
                }
            }
            None => warn!(%from, "no receiver registered, dropping message"),
        }
    }

    /// Ask `peer` for the orders of `channel`. Only a peer asked this way,
    /// or the elected member, may answer with a SYNC_RECEIVE.
    pub async fn request_sync(&self, channel: &ChannelId, peer: &PeerId) {
        debug!(%channel, %peer, "requesting sync");
        self.election.requested(channel, peer);
        if let Err(err) = self.send_direct(peer, protocol::sync_request(channel)).await {
            self.election.cancel_request(channel, peer);
            warn!(%channel, %peer, error = %err, "sync request failed");
        }
    }
}

async fn run_outbound(
    network: Arc<dyn Network>,
    local_peer_id: PeerId,
    mut queue: mpsc::UnboundedReceiver<WireMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let message = tokio::select! {
            _ = shutdown.changed() => break,
            message = queue.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let topic = match message.channel() {
            Ok(channel) => channel.topic(),
            Err(err) => {
                warn!(error = %err, "dropping message for an invalid channel");
                continue;
            }
        };
        let data = message.with_sender(&local_peer_id).encode_to_vec();
        if let Err(err) = network.publish(&topic, data).await {
            warn!(%topic, error = %err, "publish failed");
        }
    }
    debug!("outbound publisher stopped");
}

async fn run_inbound(
    p2p: Weak<P2p>,
    mut inbound: DirectMessages,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let message = tokio::select! {
            _ = shutdown.changed() => break,
            message = inbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let Some(p2p) = p2p.upgrade() else { break };
        p2p.deliver(&message.data, &message.from, Origin::Stream).await;
    }
    debug!("stream listener stopped");
}

async fn listen(
    p2p: Weak<P2p>,
    channel: ChannelId,
    mut events: TopicEvents,
    mut cancelled: watch::Receiver<bool>,
) {
    let mut sync_requested = false;

    loop {
        let event = tokio::select! {
            biased;
            _ = cancelled.changed() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let Some(p2p) = p2p.upgrade() else { break };
        match event {
            TopicEvent::Message { from, data } => {
                if from != p2p.local_peer_id {
                    p2p.deliver(&data, &from, Origin::Topic).await;
                }
            }
            TopicEvent::PeerJoined(peer) => {
                if peer == p2p.local_peer_id {
                    continue;
                }
                debug!(%channel, %peer, "peer joined");

                if !sync_requested {
                    sync_requested = true;
                    p2p.request_sync(&channel, &peer).await;
                }

                if let Err(err) = p2p.send(p2p.election.ping(&channel, &peer)) {
                    warn!(%channel, error = %err, "ping failed");
                }
            }
        }
    }
    debug!(%channel, "listener stopped");
}
