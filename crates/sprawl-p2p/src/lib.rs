//! # Sprawl P2P
//!
//! The overlay network of a Sprawl node.
//!
//! ## Overview
//!
//! Every channel is a pub/sub topic. Order operations are broadcast on the
//! channel's topic; sync traffic travels over direct streams between two
//! peers. All traffic, broadcast or direct, is handed to one registered
//! [`Receiver`].
//!
//! ## Backends
//!
//! - [`Libp2pNetwork`] - gossipsub, Kademlia discovery, and request/response
//!   streams over TCP with Noise and Yamux
//! - [`MemoryNetwork`] - in-process wiring for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sprawl_core::{ChannelId, Keypair};
//! use sprawl_p2p::{HostConfig, Libp2pNetwork, P2p};
//!
//! async fn example() -> sprawl_p2p::Result<()> {
//!     let keypair = Keypair::generate();
//!     let network = Libp2pNetwork::start(&keypair, HostConfig::default()).await?;
//!     let p2p = P2p::start(network).await;
//!
//!     p2p.subscribe(&ChannelId::derive("ETH", "BTC")).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Joining a channel
//!
//! A node that subscribes asks the first member it sees for the channel's
//! orders. Members also broadcast a PING naming the newcomer, which starts
//! an [`election`] of one member to serve a second sync.

pub mod behaviour;
pub mod election;
pub mod error;
pub mod host;
pub mod p2p;
pub mod protocol;
pub mod transport;

pub use election::Election;
pub use error::{P2pError, Result};
pub use host::{HostConfig, Libp2pNetwork};
pub use p2p::{Origin, P2p, Receiver, Stream};
pub use transport::{
    memory::MemoryNetwork, memory::MemoryTransport, DirectMessage, DirectMessages, Network,
    TopicEvent, TopicEvents,
};
