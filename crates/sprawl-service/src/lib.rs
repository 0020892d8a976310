//! # Sprawl Service
//!
//! The services of a Sprawl node: orders, channels, identity, and peers.
//!
//! ## Overview
//!
//! The services keep a local projection of the channels this node has
//! joined and the orders in them. Local calls write the projection and
//! broadcast; network messages are authenticated and applied by
//! [`OrderService`], which is registered as the overlay's receiver.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sprawl_core::CreateRequest;
//! use sprawl_p2p::{HostConfig, Libp2pNetwork, P2p};
//! use sprawl_service::{ChannelService, Identity, OrderService};
//! use sprawl_store::SqliteStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = Arc::new(SqliteStore::open("sprawl.db")?);
//!     let identity = Arc::new(Identity::load_or_generate(&*storage).await?);
//!     let network = Libp2pNetwork::start(identity.keypair(), HostConfig::default()).await?;
//!     let p2p = P2p::start(network).await;
//!
//!     let orders = Arc::new(OrderService::new(storage.clone(), p2p.clone(), identity));
//!     p2p.add_receiver(orders.clone()).await;
//!
//!     let channel = ChannelService::new(storage, p2p).join("ETH", "BTC").await?;
//!     let order = orders
//!         .create(CreateRequest {
//!             channel_id: channel.id,
//!             asset: "ETH".into(),
//!             counter_asset: "BTC".into(),
//!             amount: 52617562718,
//!             price: 0.1,
//!         })
//!         .await?;
//!     println!("created {:?}", order.id);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Policy
//!
//! Errors from local calls are returned and carry a [`StatusCode`]. Errors
//! caused by network input are logged and dropped; the sending peer gets no
//! feedback.

pub mod channel;
pub mod error;
pub mod identity;
pub mod node;
pub mod order;

pub use channel::ChannelService;
pub use error::{Result, ServiceError, StatusCode};
pub use identity::Identity;
pub use node::NodeService;
pub use order::OrderService;
