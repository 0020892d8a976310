//! The libp2p behaviours composed into a Sprawl node:
//!      1. Gossipsub: one topic per channel, used for broadcast
//!      2. Kademlia: peer discovery under the Sprawl namespace
//!      3. Identify: learning listen addresses of connected peers
//!      4. RequestResponse: direct streams (sync requests and replies)
//!      5. Block list: peers refused after a blacklist call
//!      6. Relay and UPnP: optional NAT traversal

use std::io::{Error as IoError, ErrorKind};
use std::iter;
use std::time::Duration;

use async_trait::async_trait;
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::allow_block_list::{self, BlockedPeers};
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::swarm::NetworkBehaviour;
use libp2p::{gossipsub, identify, identity, kad, relay, request_response, upnp, StreamProtocol};

use crate::protocol::{IDENTIFY_PROTOCOL, MAX_STREAM_MESSAGE, STREAM_PROTOCOL};

/// Timeout for a direct stream write, in seconds.
const STREAM_TIMEOUT_SECS: u64 = 30;

/// Interval between gossipsub heartbeats, in seconds.
const HEARTBEAT_INTERVAL_SECS: u64 = 1;

/// Which optional behaviours to enable.
#[derive(Debug, Clone, Copy, Default)]
pub struct BehaviourOptions {
    pub enable_relay: bool,
    pub enable_nat_port_map: bool,
}

/// Every behaviour a node runs, driven by one swarm.
#[derive(NetworkBehaviour)]
pub struct SprawlBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    pub identify: identify::Behaviour,
    pub streams: request_response::Behaviour<StreamCodec>,
    pub blocked: allow_block_list::Behaviour<BlockedPeers>,
    pub relay: Toggle<relay::Behaviour>,
    pub upnp: Toggle<upnp::tokio::Behaviour>,
}

impl SprawlBehaviour {
    pub fn new(
        keypair: &identity::Keypair,
        options: BehaviourOptions,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let peer_id = keypair.public().to_peer_id();

        // Signed messages, so the author survives relaying
        let gossipsub_config = gossipsub::ConfigBuilder::default()
            .heartbeat_interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS))
            .validation_mode(gossipsub::ValidationMode::Strict)
            .max_transmit_size(MAX_STREAM_MESSAGE)
            .build()
            .map_err(|err| err.to_string())?;
        let gossipsub = gossipsub::Behaviour::new(
            gossipsub::MessageAuthenticity::Signed(keypair.clone()),
            gossipsub_config,
        )?;

        let mut kademlia =
            kad::Behaviour::new(peer_id, kad::store::MemoryStore::new(peer_id));
        kademlia.set_mode(Some(kad::Mode::Server));

        let identify = identify::Behaviour::new(identify::Config::new(
            IDENTIFY_PROTOCOL.to_string(),
            keypair.public(),
        ));

        let streams = request_response::Behaviour::with_codec(
            StreamCodec,
            iter::once((
                StreamProtocol::new(STREAM_PROTOCOL),
                request_response::ProtocolSupport::Full,
            )),
            request_response::Config::default()
                .with_request_timeout(Duration::from_secs(STREAM_TIMEOUT_SECS)),
        );

        let relay = options
            .enable_relay
            .then(|| relay::Behaviour::new(peer_id, relay::Config::default()));
        let upnp = options
            .enable_nat_port_map
            .then(upnp::tokio::Behaviour::default);

        Ok(Self {
            gossipsub,
            kademlia,
            identify,
            streams,
            blocked: allow_block_list::Behaviour::default(),
            relay: Toggle::from(relay),
            upnp: Toggle::from(upnp),
        })
    }
}

/// Codec for direct streams.
///
/// A request is one marshaled message, written whole and followed by
/// closing the write half. The response is an empty acknowledgement.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamCodec;

#[async_trait]
impl request_response::Codec for StreamCodec {
    type Protocol = StreamProtocol;
    type Request = Vec<u8>;
    type Response = ();

    async fn read_request<T>(&mut self, _: &StreamProtocol, io: &mut T) -> Result<Vec<u8>, IoError>
    where
        T: AsyncRead + Unpin + Send,
    {
        let mut data = Vec::new();
        (&mut *io)
            .take(MAX_STREAM_MESSAGE as u64 + 1)
            .read_to_end(&mut data)
            .await?;

        if data.is_empty() {
            return Err(IoError::new(ErrorKind::InvalidData, "empty stream message"));
        }
        if data.len() > MAX_STREAM_MESSAGE {
            return Err(IoError::new(ErrorKind::InvalidData, "stream message too large"));
        }
        Ok(data)
    }

    async fn read_response<T>(&mut self, _: &StreamProtocol, _: &mut T) -> Result<(), IoError>
    where
        T: AsyncRead + Unpin + Send,
    {
        Ok(())
    }

    async fn write_request<T>(
        &mut self,
        _: &StreamProtocol,
        io: &mut T,
        request: Vec<u8>,
    ) -> Result<(), IoError>
    where
        T: AsyncWrite + Unpin + Send,
    {
        io.write_all(&request).await?;
        io.close().await
    }

    async fn write_response<T>(
        &mut self,
        _: &StreamProtocol,
        io: &mut T,
        _: (),
    ) -> Result<(), IoError>
    where
        T: AsyncWrite + Unpin + Send,
    {
        io.close().await
    }
}
